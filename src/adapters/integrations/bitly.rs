//! Bitly adapter. Implements UrlShortener via the v4 shorten endpoint.

use crate::domain::DomainError;
use crate::ports::UrlShortener;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

const BITLY_SHORTEN_URL: &str = "https://api-ssl.bitly.com/v4/shorten";

/// Requires a generic access token from the Bitly account settings.
pub struct BitlyShortener {
    client: Arc<Client>,
    endpoint: String,
    token: String,
}

#[derive(Deserialize)]
struct ShortenResponse {
    link: String,
}

impl BitlyShortener {
    pub fn new(token: String) -> Self {
        Self::with_endpoint(BITLY_SHORTEN_URL.to_string(), token)
    }

    pub fn with_endpoint(endpoint: String, token: String) -> Self {
        Self {
            client: Arc::new(Client::new()),
            endpoint,
            token,
        }
    }
}

#[async_trait::async_trait]
impl UrlShortener for BitlyShortener {
    async fn shorten(&self, long_url: &str) -> Result<String, DomainError> {
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "long_url": long_url }))
            .send()
            .await
            .map_err(|e| DomainError::Shortener(format!("Request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(DomainError::Shortener(format!(
                "Bitly API error {}: {}",
                status, text
            )));
        }

        let body: ShortenResponse = res
            .json()
            .await
            .map_err(|e| DomainError::Shortener(format!("Failed to parse Bitly response: {}", e)))?;
        Ok(body.link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};

    #[tokio::test]
    async fn test_shorten_sends_bearer_token() {
        let router = Router::new().route(
            "/v4/shorten",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(headers["authorization"], "Bearer tok");
                assert_eq!(body["long_url"], "https://maps.google.com/maps?q=1,2");
                Json(serde_json::json!({ "link": "https://bit.ly/abc" }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let shortener =
            BitlyShortener::with_endpoint(format!("http://{addr}/v4/shorten"), "tok".into());
        let short = shortener
            .shorten("https://maps.google.com/maps?q=1,2")
            .await
            .unwrap();
        assert_eq!(short, "https://bit.ly/abc");
    }
}
