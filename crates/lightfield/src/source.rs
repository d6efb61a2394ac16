use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

/// Why a single view could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid image location '{location}': {reason}")]
    Location { location: String, reason: String },
    #[error("request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("reading {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {location} failed: {source}")]
    Decode {
        location: String,
        #[source]
        source: image::ImageError,
    },
}

/// Anything that can hand out encoded view images by location.
///
/// Locations are the `{directory}{prefix}{column}_{row}.png` strings built by
/// [`crate::GridSpec::cell_location`].
pub trait ImageSource: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;

    fn describe(&self) -> String;
}

/// Fetches views over HTTP relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    http: Client,
    base: Url,
}

impl HttpImageSource {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Http {
                url: base.to_string(),
                source,
            })?;
        Ok(Self { http, base })
    }

    pub fn resolve(&self, location: &str) -> Result<Url, FetchError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Url::parse(location).map_err(|err| FetchError::Location {
                location: location.to_string(),
                reason: err.to_string(),
            });
        }
        let trimmed = location.trim_start_matches("./");
        self.base
            .join(trimmed)
            .map_err(|err| FetchError::Location {
                location: location.to_string(),
                reason: err.to_string(),
            })
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.resolve(location)?;
        debug!(%url, "requesting light-field view");
        let http_error = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?;
        let bytes = response.bytes().map_err(http_error)?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

/// Reads views from a local directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    root: PathBuf,
}

impl DirectoryImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageSource for DirectoryImageSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.root.join(location.trim_start_matches('/'));
        debug!(path = %path.display(), "reading light-field view");
        fs::read(&path).map_err(|source| FetchError::Io { path, source })
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
