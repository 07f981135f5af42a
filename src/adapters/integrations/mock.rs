//! Offline stand-ins for the shortener and map provider.

use super::static_maps::GoogleStaticMaps;
use crate::domain::{DomainError, LatLng};
use crate::ports::{MapImage, MapProvider, UrlShortener};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Returns `https://short.url/<n>` for every call.
#[derive(Default)]
pub struct MockShortener {
    calls: AtomicUsize,
}

impl MockShortener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl UrlShortener for MockShortener {
    async fn shorten(&self, long_url: &str) -> Result<String, DomainError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        info!(long_url, "[MOCK] shortening URL");
        Ok(format!("https://short.url/{n}"))
    }
}

/// Real URL building, canned image download.
pub struct MockMaps {
    urls: GoogleStaticMaps,
    fail_fetch: bool,
}

impl MockMaps {
    pub fn new() -> Self {
        Self {
            urls: GoogleStaticMaps::new(None),
            fail_fetch: false,
        }
    }

    /// Every `fetch_image` fails, as when the maps API is unreachable.
    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::new()
        }
    }
}

impl Default for MockMaps {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MapProvider for MockMaps {
    fn location_link(&self, location: &LatLng) -> String {
        self.urls.location_link(location)
    }

    fn static_map_url(&self, markers: &[LatLng], width: u32, height: u32, retina: bool) -> String {
        self.urls.static_map_url(markers, width, height, retina)
    }

    async fn fetch_image(&self, url: &str) -> Result<MapImage, DomainError> {
        if self.fail_fetch {
            return Err(DomainError::Map(format!("[MOCK] fetch refused: {url}")));
        }
        Ok(MapImage {
            content_type: "image/png".to_string(),
            // PNG signature only; enough for an attachment.
            data: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
        })
    }
}
