//! Frame byte fetching
//!
//! `FrameFetcher` is the I/O seam of the loader. `HttpFetcher` handles both
//! absolute CDN URLs (via a shared `ureq` agent) and site-relative paths,
//! which resolve against a local public root.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::trace;

use crate::core::inflight::CancelHandle;

/// Upper bound for a single frame payload
const MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Cancelled,
    /// Non-success HTTP status
    Status(u16),
    Network(String),
    Io { path: PathBuf, msg: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Cancelled => write!(f, "Request cancelled"),
            FetchError::Status(code) => write!(f, "HTTP {}", code),
            FetchError::Network(e) => write!(f, "Network error: {}", e),
            FetchError::Io { path, msg } => write!(f, "I/O error ({}): {}", path.display(), msg),
        }
    }
}

impl std::error::Error for FetchError {}

pub trait FrameFetcher: Send + Sync {
    /// Fetch the raw payload at `url`. Implementations should return
    /// `Cancelled` promptly once `cancel` is aborted.
    fn fetch(&self, url: &str, cancel: &CancelHandle) -> Result<Vec<u8>, FetchError>;
}

pub fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub struct HttpFetcher {
    agent: ureq::Agent,
    local_root: Option<PathBuf>,
}

impl HttpFetcher {
    /// `local_root` is where site-relative paths like `/frames/001.webp` live.
    pub fn new(local_root: Option<PathBuf>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .user_agent(concat!("scrollseq/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, local_root }
    }

    fn local_path(&self, url: &str) -> PathBuf {
        match &self.local_root {
            Some(root) => root.join(url.trim_start_matches('/')),
            None => Path::new(url).to_path_buf(),
        }
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = match self.agent.get(url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => return Err(FetchError::Status(code)),
            Err(e) => return Err(FetchError::Network(e.to_string())),
        };
        let mut bytes = Vec::new();
        resp.into_reader()
            .take(MAX_FRAME_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(bytes)
    }

    fn fetch_local(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.local_path(url);
        std::fs::read(&path).map_err(|e| FetchError::Io { path, msg: e.to_string() })
    }
}

impl FrameFetcher for HttpFetcher {
    fn fetch(&self, url: &str, cancel: &CancelHandle) -> Result<Vec<u8>, FetchError> {
        if cancel.is_aborted() {
            return Err(FetchError::Cancelled);
        }
        trace!("fetch {}", url);
        let bytes = if is_absolute_url(url) {
            self.fetch_http(url)?
        } else {
            self.fetch_local(url)?
        };
        // the transfer itself cannot be interrupted; drop the result instead
        if cancel.is_aborted() {
            return Err(FetchError::Cancelled);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_local_paths_resolve_under_root() {
        let root = std::env::temp_dir().join(format!("scrollseq-fetch-{}", Uuid::new_v4()));
        std::fs::create_dir_all(root.join("frames")).unwrap();
        std::fs::write(root.join("frames/001.png"), b"abc").unwrap();

        let fetcher = HttpFetcher::new(Some(root.clone()));
        let cancel = CancelHandle::new();
        assert_eq!(fetcher.fetch("/frames/001.png", &cancel).unwrap(), b"abc");
        assert!(matches!(
            fetcher.fetch("/frames/002.png", &cancel),
            Err(FetchError::Io { .. })
        ));

        cancel.abort();
        assert_eq!(fetcher.fetch("/frames/001.png", &cancel), Err(FetchError::Cancelled));

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_absolute_url_detection() {
        assert!(is_absolute_url("https://cdn.example/a.webp"));
        assert!(!is_absolute_url("/AnimationHero/a.webp"));
    }
}
