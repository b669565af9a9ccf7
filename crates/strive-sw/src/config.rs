//! Worker configuration: generation tag, pre-cache manifest, routing
//! predicates.

use serde::{Deserialize, Serialize};
use strive_cache::BucketNames;
use strive_net::{NetError, Request};
use url::Url;

/// Worker configuration. The generation tag is bumped per deployment and
/// flows into the bucket names, invalidating everything off-generation at
/// the next activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwConfig {
    /// App prefix used in bucket names.
    pub app_name: String,

    /// Deployment generation tag.
    pub generation: String,

    /// Origin the pre-cache manifest paths resolve against.
    pub origin: Url,

    /// Ordered absolute paths fetched at install. All-or-nothing.
    pub precache_manifest: Vec<String>,

    /// Always-cached page served when network and cache both fail for a
    /// navigation.
    pub offline_path: String,

    /// Extensions handled Cache-First.
    pub static_extensions: Vec<String>,

    /// Path segment marking icon assets.
    pub icons_segment: String,

    /// Web app manifest path, handled Cache-First.
    pub web_manifest_path: String,

    /// Path markers for backend API calls, handled Network-First.
    pub api_markers: Vec<String>,

    /// Backend provider hostname, handled Network-First.
    pub backend_host: String,
}

impl Default for SwConfig {
    fn default() -> Self {
        Self {
            app_name: "strive".to_string(),
            generation: format!("v{}", env!("CARGO_PKG_VERSION")),
            origin: Url::parse("https://app.strive.fit").expect("static origin URL"),
            precache_manifest: vec![
                "/".to_string(),
                "/offline.html".to_string(),
                "/manifest.webmanifest".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
            ],
            offline_path: "/offline.html".to_string(),
            static_extensions: ["js", "css", "png", "jpg", "jpeg", "svg", "ico", "woff", "woff2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            icons_segment: "icons".to_string(),
            web_manifest_path: "/manifest.webmanifest".to_string(),
            api_markers: vec!["/api/".to_string(), "/functions/".to_string()],
            backend_host: "functions.strive.fit".to_string(),
        }
    }
}

impl SwConfig {
    /// The two bucket names current for this generation.
    pub fn bucket_names(&self) -> BucketNames {
        BucketNames::for_generation(&self.app_name, &self.generation)
    }

    /// The request under which the offline fallback page is cached.
    pub fn offline_request(&self) -> Result<Request, NetError> {
        let url = self
            .origin
            .join(&self.offline_path)
            .map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        Ok(Request::get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_names_carry_generation() {
        let config = SwConfig {
            generation: "v7".to_string(),
            ..SwConfig::default()
        };
        let names = config.bucket_names();
        assert_eq!(names.static_name, "strive-static-v7");
        assert_eq!(names.dynamic_name, "strive-dynamic-v7");
    }

    #[test]
    fn test_offline_request_resolves_against_origin() {
        let config = SwConfig::default();
        let request = config.offline_request().unwrap();
        assert_eq!(request.url.as_str(), "https://app.strive.fit/offline.html");
    }

    #[test]
    fn test_offline_page_is_a_manifest_member() {
        let config = SwConfig::default();
        assert!(config.precache_manifest.contains(&config.offline_path));
    }
}
