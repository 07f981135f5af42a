//! Google Maps adapter. Location links, static map URLs and image download.

use crate::domain::{DomainError, LatLng};
use crate::ports::{MapImage, MapProvider};
use reqwest::{Client, Url};
use tracing::debug;

const STATIC_MAPS_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";
const MAPS_LINK_URL: &str = "https://maps.google.com/maps";

pub struct GoogleStaticMaps {
    client: Client,
    api_key: Option<String>,
}

impl GoogleStaticMaps {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }
}

/// `|lat,lng|lat,lng`
pub fn markers_param(markers: &[LatLng]) -> String {
    markers
        .iter()
        .map(|m| format!("|{},{}", m.lat, m.lng))
        .collect()
}

#[async_trait::async_trait]
impl MapProvider for GoogleStaticMaps {
    fn location_link(&self, location: &LatLng) -> String {
        format!("{MAPS_LINK_URL}?q={},{}", location.lat, location.lng)
    }

    fn static_map_url(&self, markers: &[LatLng], width: u32, height: u32, retina: bool) -> String {
        let size = format!("{width}x{height}");
        let mut params = vec![
            ("visual_refresh", "true".to_string()),
            ("size", size),
            ("markers", markers_param(markers)),
            ("scale", if retina { "2" } else { "1" }.to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }
        match Url::parse_with_params(STATIC_MAPS_URL, &params) {
            Ok(url) => url.to_string(),
            Err(_) => STATIC_MAPS_URL.to_string(),
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<MapImage, DomainError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::Map(format!("Request failed: {}", e)))?;
        if !res.status().is_success() {
            return Err(DomainError::Map(format!(
                "Static map request returned {}",
                res.status()
            )));
        }
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let data = res
            .bytes()
            .await
            .map_err(|e| DomainError::Map(format!("Failed to read image: {}", e)))?
            .to_vec();
        debug!(bytes = data.len(), content_type = %content_type, "static map fetched");
        Ok(MapImage { content_type, data })
    }
}
