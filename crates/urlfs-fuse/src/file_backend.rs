//! `file://` backend serving local files with positional reads.

use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use crate::error::NetworkError;
use crate::network::{Backend, RemoteMetadata};

#[derive(Debug, Default, Clone, Copy)]
pub struct FileBackend;

impl FileBackend {
    pub fn new() -> Self {
        FileBackend
    }
}

const FILE_PREFIX: &str = "file://";

/// Local path named by a `file://` URL.
///
/// The scheme is matched case-insensitively and `%XX` escapes in the path are
/// decoded, so `file:///tmp/a%20b` names `/tmp/a b`.
pub fn local_path(url: &str) -> Option<PathBuf> {
    url.get(..FILE_PREFIX.len())
        .filter(|scheme| scheme.eq_ignore_ascii_case(FILE_PREFIX))?;
    let rest = &url[FILE_PREFIX.len()..];
    if !rest.starts_with('/') {
        return None;
    }
    let decoded = urlencoding::decode_binary(rest.as_bytes());
    Some(PathBuf::from(OsStr::from_bytes(&decoded)))
}

fn open(url: &str) -> Result<File, NetworkError> {
    let path = local_path(url).ok_or_else(|| NetworkError::unreachable(url, "not an absolute file URL"))?;
    File::open(&path).map_err(|e| NetworkError::unreachable(url, e.to_string()))
}

impl Backend for FileBackend {
    fn is_reachable(&self, url: &str) -> bool {
        local_path(url)
            .and_then(|p| std::fs::metadata(p).ok())
            .is_some_and(|m| m.is_file())
    }

    fn fetch_metadata(&self, url: &str) -> Result<RemoteMetadata, NetworkError> {
        let meta = open(url)?
            .metadata()
            .map_err(|e| NetworkError::unreachable(url, e.to_string()))?;
        if !meta.is_file() {
            return Err(NetworkError::unreachable(url, "not a regular file"));
        }
        let modified_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(RemoteMetadata {
            size: meta.len(),
            modified_time,
        })
    }

    fn fetch_range(&self, url: &str, offset: u64, out: &mut [u8]) -> Result<usize, NetworkError> {
        let file = open(url)?;
        let mut filled = 0;
        while filled < out.len() {
            match file.read_at(&mut out[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NetworkError::unreachable(url, e.to_string())),
            }
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(contents: &[u8]) -> (NamedTempFile, String) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        let url = format!("file://{}", file.path().display());
        (file, url)
    }

    #[test]
    fn test_local_path_requires_absolute() {
        assert_eq!(local_path("file:///tmp/x"), Some(PathBuf::from("/tmp/x")));
        assert_eq!(local_path("file://relative"), None);
        assert_eq!(local_path("http://host/x"), None);
    }

    #[test]
    fn test_local_path_scheme_case_insensitive() {
        assert_eq!(local_path("File:///tmp/x"), Some(PathBuf::from("/tmp/x")));
        assert_eq!(local_path("FILE:///tmp/x"), Some(PathBuf::from("/tmp/x")));
        assert_eq!(local_path("fIlE:/"), None);
    }

    #[test]
    fn test_local_path_decodes_escapes() {
        assert_eq!(
            local_path("file:///tmp/a%20b%2Fc"),
            Some(PathBuf::from("/tmp/a b/c"))
        );
    }

    #[test]
    fn test_escaped_name_is_reachable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a b"), b"spaced").unwrap();
        let url = format!("file://{}/a%20b", dir.path().display());
        let backend = FileBackend::new();
        assert!(backend.is_reachable(&url));
        assert_eq!(backend.fetch_metadata(&url).unwrap().size, 6);
    }

    #[test]
    fn test_reachable_and_metadata() {
        let (_file, url) = fixture(b"hello world");
        let backend = FileBackend::new();
        assert!(backend.is_reachable(&url));
        let meta = backend.fetch_metadata(&url).unwrap();
        assert_eq!(meta.size, 11);
        assert!(meta.modified_time > 0);
    }

    #[test]
    fn test_missing_file_unreachable() {
        let backend = FileBackend::new();
        let url = "file:///nonexistent_urlfs_fixture_12345";
        assert!(!backend.is_reachable(url));
        assert!(matches!(
            backend.fetch_metadata(url),
            Err(NetworkError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_fetch_range_middle() {
        let (_file, url) = fixture(b"0123456789");
        let mut buf = [0u8; 4];
        let n = FileBackend::new().fetch_range(&url, 3, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn test_fetch_range_short_at_end() {
        let (_file, url) = fixture(b"0123456789");
        let mut buf = [0u8; 8];
        let n = FileBackend::new().fetch_range(&url, 7, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..n], b"789");
    }
}
