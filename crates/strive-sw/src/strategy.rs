//! The three cache strategies behind a single gateway entry point.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::classify::{classify, RouteClass, StrategyKind};
use crate::config::SwConfig;
use crate::SwError;
use strive_cache::{store_if_cacheable, SharedStorage};
use strive_net::{Fetch, Request, Response};

/// Retries after the first failed cache write.
const WRITE_RETRIES: u32 = 2;

/// Entry point for every request while the worker is active. Classifies
/// the request and executes the matching strategy against the shared
/// cache storage.
pub struct FetchGateway {
    fetcher: Arc<dyn Fetch>,
    storage: SharedStorage,
    config: SwConfig,
}

impl FetchGateway {
    /// Create a new gateway.
    pub fn new(fetcher: Arc<dyn Fetch>, storage: SharedStorage, config: SwConfig) -> Self {
        Self {
            fetcher,
            storage,
            config,
        }
    }

    /// Handle one request. A pending strategy never blocks concurrent
    /// calls; all storage access is per-await-point.
    pub async fn handle(&self, request: &Request) -> Result<Response, SwError> {
        let class = classify(request, &self.config);
        debug!(url = %request.url, class = ?class, "Dispatching request");

        match class.strategy() {
            None => Ok(self.fetcher.fetch(request).await?),
            Some(StrategyKind::CacheFirst) => self.cache_first(request).await,
            Some(StrategyKind::NetworkFirst) => self.network_first(request).await,
            Some(StrategyKind::StaleWhileRevalidate) => {
                self.stale_while_revalidate(request, class).await
            }
        }
    }

    /// Static bucket hit wins outright; the network is only consulted on
    /// a miss.
    async fn cache_first(&self, request: &Request) -> Result<Response, SwError> {
        let names = self.config.bucket_names();
        let key = request.cache_key();

        if let Some(response) = self.lookup(&names.static_name, &key).await {
            return Ok(response);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store_with_retry(&self.storage, &names.static_name, request, &response).await;
                Ok(response)
            }
            Err(err) => {
                // A concurrent install or sibling request may have filled
                // the entry while the fetch was in flight.
                if let Some(response) = self.lookup(&names.static_name, &key).await {
                    return Ok(response);
                }
                if let Some(offline) = self.offline_fallback().await {
                    return Ok(offline);
                }
                Err(err.into())
            }
        }
    }

    /// Network wins when reachable; the dynamic bucket answers when it
    /// is not.
    async fn network_first(&self, request: &Request) -> Result<Response, SwError> {
        let names = self.config.bucket_names();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store_with_retry(&self.storage, &names.dynamic_name, request, &response).await;
                Ok(response)
            }
            Err(err) => {
                if let Some(response) = self.lookup(&names.dynamic_name, &request.cache_key()).await
                {
                    debug!(url = %request.url, "Network down, serving stale entry");
                    return Ok(response);
                }
                if request.is_navigation() {
                    if let Some(offline) = self.offline_fallback().await {
                        return Ok(offline);
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Answer from the dynamic bucket immediately and refresh the entry
    /// in the background; only a miss awaits the network.
    async fn stale_while_revalidate(
        &self,
        request: &Request,
        class: RouteClass,
    ) -> Result<Response, SwError> {
        let names = self.config.bucket_names();
        let key = request.cache_key();

        if let Some(response) = self.lookup(&names.dynamic_name, &key).await {
            self.spawn_revalidate(request.clone(), names.dynamic_name);
            return Ok(response);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                store_with_retry(&self.storage, &names.dynamic_name, request, &response).await;
                Ok(response)
            }
            Err(err) => {
                if class == RouteClass::Navigation || request.is_navigation() {
                    if let Some(offline) = self.offline_fallback().await {
                        return Ok(offline);
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Detached refresh. The caller never awaits this; failures are
    /// swallowed.
    fn spawn_revalidate(&self, request: Request, bucket: String) {
        let fetcher = Arc::clone(&self.fetcher);
        let storage = Arc::clone(&self.storage);
        tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) => {
                    store_with_retry(&storage, &bucket, &request, &response).await;
                }
                Err(err) => {
                    debug!(url = %request.url, error = %err, "Background revalidation failed");
                }
            }
        });
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Option<Response> {
        let storage = self.storage.read().await;
        storage.lookup(bucket, key).map(|entry| entry.to_response())
    }

    /// The reserved offline page from the static bucket, if installed.
    async fn offline_fallback(&self) -> Option<Response> {
        let request = self.config.offline_request().ok()?;
        let names = self.config.bucket_names();
        self.lookup(&names.static_name, &request.cache_key()).await
    }
}

/// Best-effort cache write: bounded retry with jittered backoff, then
/// log and swallow. A write never blocks or fails the returned response.
pub(crate) async fn store_with_retry(
    storage: &SharedStorage,
    bucket: &str,
    request: &Request,
    response: &Response,
) {
    for attempt in 0..=WRITE_RETRIES {
        let result = {
            let mut storage = storage.write().await;
            store_if_cacheable(storage.open(bucket), request, response)
        };
        match result {
            Ok(_) => return,
            Err(err) if attempt < WRITE_RETRIES => {
                let backoff = rand::thread_rng().gen_range(10..30);
                debug!(
                    url = %request.url,
                    error = %err,
                    attempt,
                    "Cache write failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "Cache write failed, giving up");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{settle, MockFetch};
    use strive_cache::{CachedEntry, CacheStorage};
    use url::Url;

    const ORIGIN: &str = "https://app.strive.fit";

    fn gateway(fetch: MockFetch) -> (FetchGateway, Arc<MockFetch>) {
        let fetch = Arc::new(fetch);
        let gateway = FetchGateway::new(
            Arc::clone(&fetch) as Arc<dyn Fetch>,
            CacheStorage::shared(),
            SwConfig::default(),
        );
        (gateway, fetch)
    }

    fn get(path: &str) -> Request {
        Request::get(Url::parse(&format!("{ORIGIN}{path}")).unwrap())
    }

    fn navigate(path: &str) -> Request {
        Request::navigate(Url::parse(&format!("{ORIGIN}{path}")).unwrap())
    }

    async fn precache_offline(gateway: &FetchGateway) {
        let request = gateway.config.offline_request().unwrap();
        let response = Response::new(
            request.url.clone(),
            http::StatusCode::OK,
            bytes::Bytes::from_static(b"<h1>You are offline</h1>"),
        );
        let names = gateway.config.bucket_names();
        let mut storage = gateway.storage.write().await;
        store_if_cacheable(storage.open(&names.static_name), &request, &response).unwrap();
    }

    #[tokio::test]
    async fn test_cache_first_second_hit_makes_zero_network_calls() {
        let fetch = MockFetch::new().respond(&format!("{ORIGIN}/styles/app.css"), 200, "body{}");
        let (gateway, fetch) = gateway(fetch);
        let request = get("/styles/app.css");

        let first = gateway.handle(&request).await.unwrap();
        assert!(!first.from_cache);

        let second = gateway.handle(&request).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, first.body);
        assert_eq!(fetch.hits(&format!("{ORIGIN}/styles/app.css")), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_with_network_down_serves_offline_page() {
        let fetch = MockFetch::new().fail(&format!("{ORIGIN}/styles/app.css"));
        let (gateway, _fetch) = gateway(fetch);
        precache_offline(&gateway).await;

        let response = gateway.handle(&get("/styles/app.css")).await.unwrap();
        assert_eq!(response.body.as_ref(), b"<h1>You are offline</h1>");
    }

    #[tokio::test]
    async fn test_cache_first_miss_without_offline_page_propagates_failure() {
        let fetch = MockFetch::new().fail(&format!("{ORIGIN}/styles/app.css"));
        let (gateway, _fetch) = gateway(fetch);

        let result = gateway.handle(&get("/styles/app.css")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_network_first_serves_stale_payload_when_network_fails() {
        let url = format!("{ORIGIN}/api/plans");
        let fetch = MockFetch::new()
            .respond(&url, 200, "{\"plan\":\"week-3\"}")
            .fail(&url);
        let (gateway, _fetch) = gateway(fetch);
        let request = get("/api/plans");

        let fresh = gateway.handle(&request).await.unwrap();
        assert!(!fresh.from_cache);

        let stale = gateway.handle(&request).await.unwrap();
        assert!(stale.from_cache);
        assert_eq!(stale.body.as_ref(), b"{\"plan\":\"week-3\"}");
    }

    #[tokio::test]
    async fn test_network_first_miss_without_navigation_propagates_failure() {
        let fetch = MockFetch::new().fail(&format!("{ORIGIN}/api/plans"));
        let (gateway, _fetch) = gateway(fetch);

        let result = gateway.handle(&get("/api/plans")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_api_navigation_with_network_down_serves_offline_page() {
        let fetch = MockFetch::new().fail(&format!("{ORIGIN}/api/report"));
        let (gateway, _fetch) = gateway(fetch);
        precache_offline(&gateway).await;

        let response = gateway.handle(&navigate("/api/report")).await.unwrap();
        assert_eq!(response.body.as_ref(), b"<h1>You are offline</h1>");
    }

    #[tokio::test]
    async fn test_uncached_navigation_with_network_down_serves_offline_page() {
        let fetch = MockFetch::new().fail(&format!("{ORIGIN}/dashboard"));
        let (gateway, _fetch) = gateway(fetch);
        precache_offline(&gateway).await;

        let response = gateway.handle(&navigate("/dashboard")).await.unwrap();
        assert_eq!(response.body.as_ref(), b"<h1>You are offline</h1>");
    }

    #[tokio::test]
    async fn test_swr_returns_stale_and_refreshes_in_background() {
        let url = format!("{ORIGIN}/athletes");
        let fetch = MockFetch::new()
            .respond(&url, 200, "roster-v1")
            .respond(&url, 200, "roster-v2");
        let (gateway, _fetch) = gateway(fetch);
        let request = get("/athletes");

        let first = gateway.handle(&request).await.unwrap();
        assert_eq!(first.body.as_ref(), b"roster-v1");

        // Served from cache; the refresh runs detached.
        let second = gateway.handle(&request).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body.as_ref(), b"roster-v1");

        settle().await;

        let third = gateway.handle(&request).await.unwrap();
        assert_eq!(third.body.as_ref(), b"roster-v2");
    }

    #[tokio::test]
    async fn test_swr_background_failure_is_swallowed() {
        let url = format!("{ORIGIN}/athletes");
        let fetch = MockFetch::new().respond(&url, 200, "roster").fail(&url);
        let (gateway, _fetch) = gateway(fetch);
        let request = get("/athletes");

        gateway.handle(&request).await.unwrap();
        let cached = gateway.handle(&request).await.unwrap();
        assert!(cached.from_cache);

        settle().await;

        // The failed refresh left the entry untouched.
        let still_cached = gateway.handle(&request).await.unwrap();
        assert_eq!(still_cached.body.as_ref(), b"roster");
    }

    #[tokio::test]
    async fn test_non_success_response_returned_but_never_cached() {
        let url = format!("{ORIGIN}/api/plans");
        let fetch = MockFetch::new().respond(&url, 500, "boom");
        let (gateway, _fetch) = gateway(fetch);
        let request = get("/api/plans");

        let response = gateway.handle(&request).await.unwrap();
        assert_eq!(response.status.as_u16(), 500);

        let names = gateway.config.bucket_names();
        let storage = gateway.storage.read().await;
        assert!(storage
            .lookup(&names.dynamic_name, &request.cache_key())
            .is_none());
    }

    #[tokio::test]
    async fn test_bypass_never_touches_storage() {
        let url = "chrome-extension://abcdef/content.js";
        let fetch = MockFetch::new().respond(url, 200, "js");
        let (gateway, _fetch) = gateway(fetch);

        let request = Request::get(Url::parse(url).unwrap());
        let response = gateway.handle(&request).await.unwrap();
        assert!(!response.from_cache);

        let storage = gateway.storage.read().await;
        assert!(storage.names().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_recheck_after_failure_is_race_safe() {
        let url = format!("{ORIGIN}/styles/app.css");
        let fetch = MockFetch::new().fail(&url);
        let (gateway, _fetch) = gateway(fetch);
        let request = get("/styles/app.css");

        // Simulate a sibling request having filled the entry before our
        // failed fetch resolved.
        {
            let names = gateway.config.bucket_names();
            let response = Response::new(
                request.url.clone(),
                http::StatusCode::OK,
                bytes::Bytes::from_static(b"body{}"),
            );
            let mut storage = gateway.storage.write().await;
            storage
                .open(&names.static_name)
                .put(&request.cache_key(), CachedEntry::from_response(&request, &response))
                .unwrap();
        }

        // The first lookup in cache_first sees the entry and never
        // reaches the failing fetch; the invariant holds either way.
        let response = gateway.handle(&request).await.unwrap();
        assert!(response.from_cache);
    }
}
