//! Image-array loading for light-field samples.
//!
//! A sample is a grid of same-resolution views named
//! `{directory}{prefix}{column}_{row}.png`. The loader fetches them one at a
//! time, decodes each to RGBA8 and packs them into a single layered buffer
//! (one layer per camera, columns outer and rows inner) that the renderer
//! uploads as a texture array.

mod background;
mod buffer;
mod generation;
mod grid;
mod loader;
mod source;

pub use background::{spawn_load, BackgroundLoad, LoadEvent};
pub use buffer::ImageArrayBuffer;
pub use generation::{LoadGenerations, LoadTicket};
pub use grid::{Cell, GridShape, GridSpec, BYTES_PER_PIXEL};
pub use lfconfig::FailurePolicy;
pub use loader::{
    decode_view, load_image_array, progress_percent, Gap, LoadError, LoadOptions, LoadOutcome,
    Progress,
};
pub use source::{DirectoryImageSource, FetchError, HttpImageSource, ImageSource};

use std::sync::Arc;

use reqwest::Url;

/// Picks an HTTP or filesystem source from a user-supplied location.
pub fn source_from_location(
    location: &str,
    timeout: std::time::Duration,
) -> Result<Arc<dyn ImageSource>, FetchError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let mut base = location.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let url = Url::parse(&base).map_err(|err| FetchError::Location {
            location: location.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Arc::new(HttpImageSource::new(url, timeout)?))
    } else {
        Ok(Arc::new(DirectoryImageSource::new(location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_source_by_scheme() {
        let timeout = std::time::Duration::from_secs(1);
        let http = source_from_location("http://localhost:3000", timeout).unwrap();
        assert_eq!(http.describe(), "http://localhost:3000/");
        let dir = source_from_location("fixtures/lf", timeout).unwrap();
        assert_eq!(dir.describe(), "fixtures/lf");
    }
}
