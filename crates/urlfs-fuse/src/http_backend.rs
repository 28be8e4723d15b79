//! HTTP(S) backend built on `reqwest`.
//!
//! Requests run on the daemon's tokio runtime; the synchronous [`Backend`]
//! methods block the calling FUSE worker thread on the runtime handle. They
//! must not be called from inside an async task.

use std::time::Duration;

use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, LAST_MODIFIED, RANGE};
use reqwest::{Client, StatusCode};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::network::{Backend, NetworkConfig, RemoteMetadata};

pub struct HttpBackend {
    client: Client,
    runtime: Handle,
}

impl HttpBackend {
    pub fn new(config: &NetworkConfig, runtime: Handle) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NetworkError::unreachable("http", e.to_string()))?;
        Ok(Self { client, runtime })
    }

    async fn head(&self, url: &str) -> Result<reqwest::Response, NetworkError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| NetworkError::unreachable(url, e.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(NetworkError::unreachable(
                url,
                format!("HEAD returned {}", response.status()),
            ));
        }
        Ok(response)
    }

    async fn get_range(&self, url: &str, offset: u64, out: &mut [u8]) -> Result<usize, NetworkError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, range_header(offset, out.len() as u64))
            .send()
            .await
            .map_err(|e| NetworkError::unreachable(url, e.to_string()))?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(NetworkError::unreachable(
                url,
                format!("range GET returned {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::unreachable(url, e.to_string()))?;
        if body.len() > out.len() {
            return Err(NetworkError::unreachable(
                url,
                format!("server sent {} bytes for a {} byte range", body.len(), out.len()),
            ));
        }

        out[..body.len()].copy_from_slice(&body);
        Ok(body.len())
    }
}

impl Backend for HttpBackend {
    fn is_reachable(&self, url: &str) -> bool {
        match self.runtime.block_on(self.head(url)) {
            Ok(response) => {
                let accepts = response
                    .headers()
                    .get(ACCEPT_RANGES)
                    .and_then(|v| v.to_str().ok());
                accepts_byte_ranges(accepts)
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn fetch_metadata(&self, url: &str) -> Result<RemoteMetadata, NetworkError> {
        let response = self.runtime.block_on(self.head(url))?;
        let headers = response.headers();

        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&len| len > 0)
            .ok_or_else(|| NetworkError::unreachable(url, "missing or zero Content-Length"))?;

        let modified_time = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date)
            .unwrap_or(0);

        debug!("metadata url={} size={} mtime={}", url, size, modified_time);
        Ok(RemoteMetadata {
            size,
            modified_time,
        })
    }

    fn fetch_range(&self, url: &str, offset: u64, out: &mut [u8]) -> Result<usize, NetworkError> {
        if out.is_empty() {
            return Ok(0);
        }
        self.runtime.block_on(self.get_range(url, offset, out))
    }
}

/// `Range` header value covering `length` bytes from `offset` (inclusive end).
pub fn range_header(offset: u64, length: u64) -> String {
    format!("bytes={}-{}", offset, offset + length.max(1) - 1)
}

pub fn accepts_byte_ranges(header: Option<&str>) -> bool {
    header.is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"))
}

/// Parse an HTTP-date such as `Wed, 21 Oct 2015 07:28:00 GMT` to epoch seconds.
pub fn parse_http_date(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_inclusive_end() {
        assert_eq!(range_header(90, 10), "bytes=90-99");
        assert_eq!(range_header(0, 1), "bytes=0-0");
    }

    #[test]
    fn test_accepts_byte_ranges() {
        assert!(accepts_byte_ranges(Some("bytes")));
        assert!(accepts_byte_ranges(Some(" Bytes ")));
        assert!(!accepts_byte_ranges(Some("none")));
        assert!(!accepts_byte_ranges(None));
    }

    #[test]
    fn test_parse_http_date() {
        assert_eq!(
            parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(1_445_412_480)
        );
    }

    #[test]
    fn test_parse_http_date_garbage() {
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_backend_builds_from_default_config() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let backend = HttpBackend::new(&NetworkConfig::default(), runtime.handle().clone());
        assert!(backend.is_ok());
    }

    #[test]
    fn test_empty_range_needs_no_request() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let backend = HttpBackend::new(&NetworkConfig::default(), runtime.handle().clone()).unwrap();
        let mut out = [0u8; 0];
        assert_eq!(backend.fetch_range("http://127.0.0.1:9/f", 0, &mut out), Ok(0));
    }
}
