//! # Strive Cache
//!
//! Named cache buckets for the Strive offline shell.
//!
//! ## Features
//!
//! - **CacheBucket**: request-key → response snapshot store
//! - **CacheStorage**: named bucket registry, create-on-first-use
//! - **Generation tags**: bucket names carry the deployment generation;
//!   anything off-generation is garbage at the next activation
//! - **Cacheability guard**: only GET, only http(s), only 2xx snapshots
//!   are ever written
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage
//!     ├── "strive-static-v3"   (eager, populated at install)
//!     │       └── "GET /styles/app.css" → CachedEntry
//!     └── "strive-dynamic-v3"  (lazy, populated at runtime)
//!             └── "GET /api/plans"      → CachedEntry
//! ```

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use strive_net::{Request, Response};

// ==================== Errors ====================

/// Errors that can occur in cache operations.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
}

// ==================== Entries ====================

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored-at timestamp (ms since epoch).
    pub stored_at_ms: u64,
}

impl CachedEntry {
    /// Snapshot a response for storage.
    pub fn from_response(request: &Request, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            url: request.url.to_string(),
            method: request.method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            stored_at_ms: now_ms(),
        }
    }

    /// Rehydrate the snapshot as a servable response.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }
        Response {
            url: url::Url::parse(&self.url)
                .unwrap_or_else(|_| url::Url::parse("about:blank").expect("fixed URL")),
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: Bytes::from(self.body.clone()),
            from_cache: true,
        }
    }
}

// ==================== Bucket ====================

/// A named cache bucket.
#[derive(Debug, Default, Clone)]
pub struct CacheBucket {
    /// Bucket name, generation tag included.
    pub name: String,

    /// Cached entries keyed by request identity.
    entries: HashMap<String, CachedEntry>,
}

impl CacheBucket {
    /// Create a new bucket.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Look up an entry by request identity.
    pub fn lookup(&self, key: &str) -> Option<&CachedEntry> {
        self.entries.get(key)
    }

    /// Store an entry. Last writer wins on duplicate keys.
    pub fn put(&mut self, key: &str, entry: CachedEntry) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Delete an entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All entry keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bucket holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Storage ====================

/// Named-bucket registry.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, CacheBucket>,
}

/// Storage handle shared between the gateway and the lifecycle controller.
pub type SharedStorage = Arc<RwLock<CacheStorage>>;

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage behind the shared handle.
    pub fn shared() -> SharedStorage {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Open a bucket, creating it on first use.
    pub fn open(&mut self, name: &str) -> &mut CacheBucket {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| CacheBucket::new(name))
    }

    /// Check if a bucket exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Look up an entry without creating the bucket.
    pub fn lookup(&self, bucket: &str, key: &str) -> Option<&CachedEntry> {
        self.caches.get(bucket).and_then(|b| b.lookup(key))
    }

    /// Delete a bucket.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All bucket names.
    pub fn names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }
}

// ==================== Generations ====================

/// The two bucket names current for a deployment generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNames {
    /// Eagerly populated shell assets.
    pub static_name: String,

    /// Lazily populated runtime responses.
    pub dynamic_name: String,
}

impl BucketNames {
    /// Derive the current bucket names from an app prefix and generation tag.
    pub fn for_generation(app: &str, generation: &str) -> Self {
        Self {
            static_name: format!("{app}-static-{generation}"),
            dynamic_name: format!("{app}-dynamic-{generation}"),
        }
    }

    /// Whether a bucket name belongs to the current generation.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }
}

/// Delete every bucket not matching the current generation names.
/// Returns the deleted bucket names.
pub fn prune_stale(storage: &mut CacheStorage, names: &BucketNames) -> Vec<String> {
    let stale: Vec<String> = storage
        .names()
        .into_iter()
        .filter(|name| !names.is_current(name))
        .collect();
    for name in &stale {
        storage.delete(name);
        info!(bucket = %name, "Pruned stale cache bucket");
    }
    stale
}

// ==================== Cacheability ====================

/// Whether a request/response pair may ever be stored: only GET, only
/// http(s), only successful responses.
pub fn cacheable(request: &Request, response: &Response) -> bool {
    request.method == http::Method::GET
        && matches!(request.url.scheme(), "http" | "https")
        && response.ok()
}

/// Store the response snapshot if the pair is cacheable. Returns whether
/// an entry was written.
pub fn store_if_cacheable(
    bucket: &mut CacheBucket,
    request: &Request,
    response: &Response,
) -> Result<bool, CacheError> {
    if !cacheable(request, response) {
        debug!(
            url = %request.url,
            method = %request.method,
            status = %response.status,
            "Skipping uncacheable response"
        );
        return Ok(false);
    }
    bucket.put(&request.cache_key(), CachedEntry::from_response(request, response))?;
    Ok(true)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use url::Url;

    fn request(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    fn response(url: &str, status: u16, body: &str) -> Response {
        Response::new(
            Url::parse(url).unwrap(),
            StatusCode::from_u16(status).unwrap(),
            Bytes::from(body.as_bytes().to_vec()),
        )
    }

    #[test]
    fn test_bucket_put_and_lookup() {
        let mut bucket = CacheBucket::new("strive-static-v1");
        let request = request("https://app.strive.fit/styles/app.css");
        let response = response("https://app.strive.fit/styles/app.css", 200, "body{}");

        store_if_cacheable(&mut bucket, &request, &response).unwrap();

        let entry = bucket.lookup(&request.cache_key()).unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, b"body{}");
    }

    #[test]
    fn test_bucket_delete() {
        let mut bucket = CacheBucket::new("strive-static-v1");
        let request = request("https://app.strive.fit/app.js");
        let response = response("https://app.strive.fit/app.js", 200, "js");

        store_if_cacheable(&mut bucket, &request, &response).unwrap();
        assert!(bucket.delete(&request.cache_key()));
        assert!(bucket.lookup(&request.cache_key()).is_none());
    }

    #[test]
    fn test_entry_rehydrates_as_cache_hit() {
        let request = request("https://app.strive.fit/offline.html");
        let mut original = response("https://app.strive.fit/offline.html", 200, "<h1>Offline</h1>");
        original
            .headers
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let entry = CachedEntry::from_response(&request, &original);
        let served = entry.to_response();

        assert!(served.from_cache);
        assert_eq!(served.status, StatusCode::OK);
        assert_eq!(served.body, original.body);
        assert_eq!(
            served.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
    }

    #[test]
    fn test_non_success_never_stored_but_guard_reports_it() {
        let mut bucket = CacheBucket::new("strive-dynamic-v1");
        let request = request("https://app.strive.fit/api/plans");
        let response = response("https://app.strive.fit/api/plans", 500, "boom");

        let stored = store_if_cacheable(&mut bucket, &request, &response).unwrap();
        assert!(!stored);
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_non_get_never_stored() {
        let mut bucket = CacheBucket::new("strive-dynamic-v1");
        let mut request = request("https://app.strive.fit/api/plans");
        request.method = Method::POST;
        let response = response("https://app.strive.fit/api/plans", 200, "{}");

        assert!(!store_if_cacheable(&mut bucket, &request, &response).unwrap());
    }

    #[test]
    fn test_non_http_scheme_never_stored() {
        let mut bucket = CacheBucket::new("strive-dynamic-v1");
        let request = Request::get(Url::parse("chrome-extension://abcdef/page.js").unwrap());
        let response = response("https://app.strive.fit/page.js", 200, "js");

        assert!(!store_if_cacheable(&mut bucket, &request, &response).unwrap());
    }

    #[test]
    fn test_last_writer_wins_on_duplicate_keys() {
        let mut bucket = CacheBucket::new("strive-dynamic-v1");
        let request = request("https://app.strive.fit/api/plans");

        store_if_cacheable(&mut bucket, &request, &response("https://app.strive.fit/api/plans", 200, "old")).unwrap();
        store_if_cacheable(&mut bucket, &request, &response("https://app.strive.fit/api/plans", 200, "new")).unwrap();

        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.lookup(&request.cache_key()).unwrap().body, b"new");
    }

    #[test]
    fn test_storage_open_creates_on_first_use() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("strive-static-v1"));

        storage.open("strive-static-v1");
        assert!(storage.has("strive-static-v1"));
    }

    #[test]
    fn test_bucket_names_for_generation() {
        let names = BucketNames::for_generation("strive", "v3");
        assert_eq!(names.static_name, "strive-static-v3");
        assert_eq!(names.dynamic_name, "strive-dynamic-v3");
        assert!(names.is_current("strive-static-v3"));
        assert!(!names.is_current("strive-static-v2"));
    }

    #[test]
    fn test_prune_leaves_exactly_the_current_generation() {
        let mut storage = CacheStorage::new();
        storage.open("strive-static-v2");
        storage.open("strive-dynamic-v2");
        storage.open("strive-static-v3");
        storage.open("strive-dynamic-v3");
        storage.open("unrelated-cache");

        let names = BucketNames::for_generation("strive", "v3");
        let mut deleted = prune_stale(&mut storage, &names);
        deleted.sort();

        assert_eq!(
            deleted,
            vec![
                "strive-dynamic-v2".to_string(),
                "strive-static-v2".to_string(),
                "unrelated-cache".to_string(),
            ]
        );
        let mut remaining = storage.names();
        remaining.sort();
        assert_eq!(
            remaining,
            vec!["strive-dynamic-v3".to_string(), "strive-static-v3".to_string()]
        );
    }
}
