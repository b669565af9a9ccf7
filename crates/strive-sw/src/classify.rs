//! Request classification: which strategy serves which request.

use crate::config::SwConfig;
use strive_net::Request;

/// Route class of an inbound request, in classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Non-http(s) scheme; never intercepted or cached.
    Bypass,
    /// Shell asset, served Cache-First from the static bucket.
    StaticAsset,
    /// Backend call, served Network-First from the dynamic bucket.
    Api,
    /// Page navigation, served Stale-While-Revalidate.
    Navigation,
    /// Everything else, served Stale-While-Revalidate.
    Other,
}

/// The three strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl RouteClass {
    /// Strategy executed for this class; `None` bypasses the cache layer.
    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            RouteClass::Bypass => None,
            RouteClass::StaticAsset => Some(StrategyKind::CacheFirst),
            RouteClass::Api => Some(StrategyKind::NetworkFirst),
            RouteClass::Navigation | RouteClass::Other => {
                Some(StrategyKind::StaleWhileRevalidate)
            }
        }
    }
}

/// Classify a request. Order matters: scheme, static asset, API,
/// navigation, default.
pub fn classify(request: &Request, config: &SwConfig) -> RouteClass {
    if !matches!(request.url.scheme(), "http" | "https") {
        return RouteClass::Bypass;
    }
    if is_static_asset(request, config) {
        return RouteClass::StaticAsset;
    }
    if is_api(request, config) {
        return RouteClass::Api;
    }
    if request.is_navigation() {
        return RouteClass::Navigation;
    }
    RouteClass::Other
}

fn is_static_asset(request: &Request, config: &SwConfig) -> bool {
    let path = request.url.path();
    if path == config.web_manifest_path {
        return true;
    }
    if path
        .split('/')
        .any(|segment| segment == config.icons_segment)
    {
        return true;
    }
    path_extension(path)
        .map(|ext| {
            config
                .static_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn is_api(request: &Request, config: &SwConfig) -> bool {
    let path = request.url.path();
    if config.api_markers.iter().any(|marker| path.contains(marker.as_str())) {
        return true;
    }
    request
        .url
        .host_str()
        .map(|host| host == config.backend_host)
        .unwrap_or(false)
}

fn path_extension(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}
