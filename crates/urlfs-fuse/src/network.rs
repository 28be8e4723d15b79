//! Network collaborator interface.
//!
//! The registry talks to remote sources only through the [`Backend`] trait.
//! Concrete backends are registered per URL scheme in a [`BackendSet`] at
//! startup; the set itself implements [`Backend`] and dispatches each call by
//! the scheme of the URL it is given.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::NetworkError;
use crate::file_backend::FileBackend;
use crate::http_backend::HttpBackend;

/// Size and modification time of a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub size: u64,
    /// Seconds since the epoch; 0 when the source does not report one.
    pub modified_time: i64,
}

/// Capability set every remote source scheme provides.
pub trait Backend: Send + Sync {
    /// Whether the resource exists and supports ranged reads.
    fn is_reachable(&self, url: &str) -> bool;
    /// Fetch size and modification time.
    fn fetch_metadata(&self, url: &str) -> Result<RemoteMetadata, NetworkError>;
    /// Read up to `out.len()` bytes starting at `offset` into `out`.
    fn fetch_range(&self, url: &str, offset: u64, out: &mut [u8]) -> Result<usize, NetworkError>;
}

/// Timeouts and identification used by the network backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            request_timeout_ms: 30000,
            user_agent: format!("urlfs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Scheme of `url`: the text before the first `:`, lowercased.
pub fn scheme_of(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once(':')?;
    let valid = !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}

/// Backends keyed by URL scheme.
#[derive(Default, Clone)]
pub struct BackendSet {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` for `scheme`, replacing any earlier registration.
    pub fn register(&mut self, scheme: &str, backend: Arc<dyn Backend>) {
        debug!("Registered backend for scheme {}", scheme);
        self.backends.insert(scheme.to_ascii_lowercase(), backend);
    }

    /// The `http`, `https` and `file` backends, built once at startup.
    pub fn standard(config: &NetworkConfig, runtime: Handle) -> Result<Self, NetworkError> {
        let http: Arc<dyn Backend> = Arc::new(HttpBackend::new(config, runtime)?);
        let mut set = Self::new();
        set.register("http", Arc::clone(&http));
        set.register("https", http);
        set.register("file", Arc::new(FileBackend::new()));
        Ok(set)
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.backends.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    pub fn resolve(&self, url: &str) -> Result<&dyn Backend, NetworkError> {
        scheme_of(url)
            .and_then(|scheme| self.backends.get(&scheme))
            .map(|b| b.as_ref())
            .ok_or_else(|| NetworkError::UnsupportedScheme {
                url: url.to_string(),
            })
    }
}

impl Backend for BackendSet {
    fn is_reachable(&self, url: &str) -> bool {
        self.resolve(url).is_ok_and(|b| b.is_reachable(url))
    }

    fn fetch_metadata(&self, url: &str) -> Result<RemoteMetadata, NetworkError> {
        self.resolve(url)?.fetch_metadata(url)
    }

    fn fetch_range(&self, url: &str, offset: u64, out: &mut [u8]) -> Result<usize, NetworkError> {
        self.resolve(url)?.fetch_range(url, offset, out)
    }
}

/// One recorded `fetch_range` call: url, offset, requested length.
pub type FetchRecord = (String, u64, usize);

/// In-memory backend serving registered byte buffers.
///
/// Used for development and tests before a real source is available; it
/// records every range fetch so callers can check what was delegated.
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<HashMap<String, (Vec<u8>, i64)>>,
    fetches: Mutex<Vec<FetchRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` with modification time `mtime` at `url`.
    pub fn insert(&self, url: &str, data: Vec<u8>, mtime: i64) {
        self.objects.lock().insert(url.to_string(), (data, mtime));
    }

    /// Stop serving `url`.
    pub fn take_offline(&self, url: &str) {
        self.objects.lock().remove(url);
    }

    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.fetches.lock().clone()
    }
}

impl Backend for MemoryBackend {
    fn is_reachable(&self, url: &str) -> bool {
        self.objects.lock().contains_key(url)
    }

    fn fetch_metadata(&self, url: &str) -> Result<RemoteMetadata, NetworkError> {
        let objects = self.objects.lock();
        let (data, mtime) = objects
            .get(url)
            .ok_or_else(|| NetworkError::unreachable(url, "not found"))?;
        Ok(RemoteMetadata {
            size: data.len() as u64,
            modified_time: *mtime,
        })
    }

    fn fetch_range(&self, url: &str, offset: u64, out: &mut [u8]) -> Result<usize, NetworkError> {
        self.fetches.lock().push((url.to_string(), offset, out.len()));
        let objects = self.objects.lock();
        let (data, _) = objects
            .get(url)
            .ok_or_else(|| NetworkError::unreachable(url, "not found"))?;
        let start = (offset as usize).min(data.len());
        let n = out.len().min(data.len() - start);
        out[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(u64);

    impl Backend for FixedBackend {
        fn is_reachable(&self, _url: &str) -> bool {
            true
        }

        fn fetch_metadata(&self, _url: &str) -> Result<RemoteMetadata, NetworkError> {
            Ok(RemoteMetadata {
                size: self.0,
                modified_time: 0,
            })
        }

        fn fetch_range(&self, _url: &str, _offset: u64, out: &mut [u8]) -> Result<usize, NetworkError> {
            out.fill(b'x');
            Ok(out.len())
        }
    }

    #[test]
    fn test_scheme_of_http() {
        assert_eq!(scheme_of("http://host/f"), Some("http".to_string()));
        assert_eq!(scheme_of("HTTPS://host/f"), Some("https".to_string()));
    }

    #[test]
    fn test_scheme_of_rejects_missing_or_bad_scheme() {
        assert_eq!(scheme_of("/no/scheme"), None);
        assert_eq!(scheme_of(":empty"), None);
        assert_eq!(scheme_of("1http://x"), None);
        assert_eq!(scheme_of("ht tp://x"), None);
    }

    #[test]
    fn test_backend_set_dispatches_by_scheme() {
        let mut set = BackendSet::new();
        set.register("http", Arc::new(FixedBackend(10)));
        set.register("file", Arc::new(FixedBackend(20)));

        assert_eq!(set.fetch_metadata("http://h/f").unwrap().size, 10);
        assert_eq!(set.fetch_metadata("file:///tmp/f").unwrap().size, 20);
        assert_eq!(set.schemes(), vec!["file".to_string(), "http".to_string()]);
    }

    #[test]
    fn test_backend_set_unknown_scheme() {
        let set = BackendSet::new();
        assert!(!set.is_reachable("gopher://h/f"));
        assert!(matches!(
            set.fetch_metadata("gopher://h/f"),
            Err(NetworkError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_backend_set_fetch_range() {
        let mut set = BackendSet::new();
        set.register("http", Arc::new(FixedBackend(10)));
        let mut buf = [0u8; 4];
        assert_eq!(set.fetch_range("http://h/f", 0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"xxxx");
    }

    #[test]
    fn test_memory_backend_serves_ranges() {
        let backend = MemoryBackend::new();
        backend.insert("mem://a", b"abcdef".to_vec(), 7);
        assert!(backend.is_reachable("mem://a"));
        assert_eq!(
            backend.fetch_metadata("mem://a").unwrap(),
            RemoteMetadata {
                size: 6,
                modified_time: 7
            }
        );

        let mut buf = [0u8; 4];
        assert_eq!(backend.fetch_range("mem://a", 4, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(backend.fetches(), vec![("mem://a".to_string(), 4, 4)]);
    }

    #[test]
    fn test_memory_backend_offline() {
        let backend = MemoryBackend::new();
        backend.insert("mem://a", vec![1], 0);
        backend.take_offline("mem://a");
        assert!(!backend.is_reachable("mem://a"));
    }

    #[test]
    fn test_standard_set_schemes() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let set = BackendSet::standard(&NetworkConfig::default(), runtime.handle().clone()).unwrap();
        assert_eq!(set.schemes(), vec!["file", "http", "https"]);
    }

    #[test]
    fn test_network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.connect_timeout_ms, 5000);
        assert_eq!(config.request_timeout_ms, 30000);
        assert!(config.user_agent.starts_with("urlfs/"));
    }
}
