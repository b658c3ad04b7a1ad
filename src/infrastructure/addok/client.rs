use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use super::GeocodingBackend;
use crate::domain::error::{AppError, Result};
use crate::domain::query::NormalizedQuery;
use crate::infrastructure::config::AppConfig;

/// Statuses worth another attempt
const RETRY_STATUS_CODES: [StatusCode; 3] = [
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

const RETRY_BASE_DELAY_MS: u64 = 100;

/// HTTP client for an addok-compatible geocoding service
pub struct AddokClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl AddokClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.service_url().to_string(),
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str, query: &NormalizedQuery) -> Result<Value> {
        let url = format!("{}/{}/", self.base_url, path);
        let pairs = query.to_pairs();
        let mut attempt = 0;

        loop {
            let reason = match self.client.get(&url).query(&pairs).send().await {
                Ok(response) if response.status().is_success() => {
                    return response.json::<Value>().await.map_err(|e| AppError::Upstream {
                        status: None,
                        message: diagnostic_code(&e).to_string(),
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    if !RETRY_STATUS_CODES.contains(&status) || attempt >= self.max_retries {
                        return Err(AppError::Upstream {
                            status: Some(status.as_u16()),
                            message: status
                                .canonical_reason()
                                .unwrap_or("Upstream error")
                                .to_string(),
                        });
                    }
                    status.to_string()
                }
                Err(err) => {
                    if !is_transient(&err) || attempt >= self.max_retries {
                        return Err(AppError::Upstream {
                            status: None,
                            message: diagnostic_code(&err).to_string(),
                        });
                    }
                    diagnostic_code(&err).to_string()
                }
            };

            attempt += 1;
            warn!(url = %url, attempt, reason = %reason, "Retrying geocoding request");
            tokio::time::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl GeocodingBackend for AddokClient {
    async fn search(&self, query: &NormalizedQuery) -> Result<Value> {
        self.get_json("search", query).await
    }

    async fn reverse(&self, query: &NormalizedQuery) -> Result<Value> {
        self.get_json("reverse", query).await
    }
}

/// Connection refused/reset, DNS failures and timeouts
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn diagnostic_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_decode() {
        "decode"
    } else if err.is_body() {
        "body"
    } else if err.is_request() {
        "request"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::query_normalizer::normalize;
    use crate::domain::query::{QueryMode, RawQuery};
    use mockito::Matcher;

    fn client_for(url: &str) -> AddokClient {
        let config = AppConfig {
            addok_service_url: url.to_string(),
            request_timeout_ms: 1000,
            ..Default::default()
        };
        AddokClient::new(&config).unwrap()
    }

    fn query(pairs: &[(&str, &str)], mode: QueryMode) -> NormalizedQuery {
        normalize(&RawQuery::from_pairs(pairs.iter().copied()), mode).unwrap()
    }

    #[tokio::test]
    async fn test_search_forwards_normalized_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "8 bd du port".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type":"FeatureCollection","features":[]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&format!("{}/", server.url()));
        let body = client
            .search(&query(&[("q", " 8 bd du port "), ("limit", "2")], QueryMode::Geocode))
            .await
            .unwrap();

        assert_eq!(body["type"], "FeatureCollection");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reverse_uses_reverse_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/reverse/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("lon".into(), "2.35".into()),
                Matcher::UrlEncoded("lat".into(), "48.85".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"features":[]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        client
            .reverse(&query(&[("lon", "2.35"), ("lat", "48.85")], QueryMode::Reverse))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transient_status_is_retried_twice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search/")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .search(&query(&[("q", "paris")], QueryMode::Geocode))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AppError::Upstream {
                status: Some(503),
                message: "Service Unavailable".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search/")
            .match_query(Matcher::Any)
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .search(&query(&[("q", "paris")], QueryMode::Geocode))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 400);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Nothing listens on the discard port
        let client = client_for("http://127.0.0.1:9");
        let err = client
            .search(&query(&[("q", "paris")], QueryMode::Geocode))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Unexpected error: connect");
    }
}
