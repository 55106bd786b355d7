//! Fetching narration bytes by URI
//!
//! `http(s)://` references are downloaded with reqwest, `file://` URLs and
//! plain paths are read from disk. Relative paths resolve against the
//! configured asset directory.

use super::AudioError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Timeout for a single narration download
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a URI points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

impl SourceLocation {
    /// File extension, used as a decoder hint
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            SourceLocation::Remote(url) => PathBuf::from(url.path()),
            SourceLocation::Local(path) => path.clone(),
        };
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Downloads or reads clip bytes
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    asset_dir: Option<PathBuf>,
}

impl SourceFetcher {
    pub fn new(asset_dir: Option<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self { client, asset_dir }
    }

    /// Work out where a URI points without touching the network or disk
    pub fn locate(&self, uri: &str) -> Result<SourceLocation, AudioError> {
        match Url::parse(uri) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(SourceLocation::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(SourceLocation::Local)
                    .map_err(|_| AudioError::load(uri, "Invalid file URL")),
                scheme => Err(AudioError::load(
                    uri,
                    format!("Unsupported scheme '{scheme}'"),
                )),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(SourceLocation::Local(self.resolve_path(uri)))
            }
            Err(e) => Err(AudioError::load(uri, e)),
        }
    }

    fn resolve_path(&self, uri: &str) -> PathBuf {
        let path = Path::new(uri);
        if path.is_absolute() && path.exists() {
            return path.to_path_buf();
        }
        match &self.asset_dir {
            Some(dir) => dir.join(uri.trim_start_matches('/')),
            None => path.to_path_buf(),
        }
    }

    /// Fetch the raw bytes behind a URI along with its extension hint
    pub async fn fetch(&self, uri: &str) -> Result<(Vec<u8>, Option<String>), AudioError> {
        let location = self.locate(uri)?;
        let extension = location.extension();

        let bytes = match location {
            SourceLocation::Remote(url) => {
                tracing::debug!("Downloading narration: {}", url);
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| AudioError::load(uri, e))?;
                response
                    .bytes()
                    .await
                    .map_err(|e| AudioError::load(uri, e))?
                    .to_vec()
            }
            SourceLocation::Local(path) => {
                tracing::debug!("Reading narration: {}", path.display());
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| AudioError::load(uri, e))?
            }
        };

        Ok((bytes, extension))
    }
}
