use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::GeocodingBackend;
use crate::domain::error::{AppError, Result};
use crate::domain::query::NormalizedQuery;

/// Result of geocoding one CSV row. Only an `Err` from [`RowGeocoder`]
/// aborts a batch; every variant here still produces an output row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Result fields keyed by result column name
    Matched(BTreeMap<String, String>),
    NotFound,
    /// The row had nothing worth sending
    Skipped,
    /// The backend refused this particular row
    Rejected,
}

impl RowOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RowOutcome::Matched(_) => "ok",
            RowOutcome::NotFound => "not-found",
            RowOutcome::Skipped => "skipped",
            RowOutcome::Rejected => "error",
        }
    }

    /// Value for one result column, empty when absent.
    pub fn field(&self, column: &str) -> String {
        if column == "result_status" {
            return self.status().to_string();
        }
        match self {
            RowOutcome::Matched(fields) => fields.get(column).cloned().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Per-row geocoding transform used by the CSV pipeline
#[async_trait]
pub trait RowGeocoder: Send + Sync {
    async fn geocode_row(&self, query: &NormalizedQuery) -> Result<RowOutcome>;
}

/// Row geocoder backed by the single-query backend
pub struct BackendRowGeocoder {
    backend: Arc<dyn GeocodingBackend + Send + Sync>,
}

impl BackendRowGeocoder {
    pub fn new(backend: Arc<dyn GeocodingBackend + Send + Sync>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl RowGeocoder for BackendRowGeocoder {
    async fn geocode_row(&self, query: &NormalizedQuery) -> Result<RowOutcome> {
        match self.backend.search(query).await {
            Ok(body) => Ok(match result_fields(&body) {
                Some(fields) => RowOutcome::Matched(fields),
                None => RowOutcome::NotFound,
            }),
            Err(AppError::Upstream {
                status: Some(status),
                message,
            }) if (400..500).contains(&status) => {
                debug!(status, message = %message, "Backend rejected row query");
                Ok(RowOutcome::Rejected)
            }
            Err(err) => Err(err),
        }
    }
}

/// Flatten the best feature of a GeoJSON FeatureCollection into result
/// columns.
pub fn result_fields(body: &Value) -> Option<BTreeMap<String, String>> {
    let feature = body["features"].as_array()?.first()?;
    let properties = &feature["properties"];
    let mut fields = BTreeMap::new();

    if let Some([lon, lat, ..]) = feature["geometry"]["coordinates"].as_array().map(Vec::as_slice) {
        fields.insert("longitude".to_string(), scalar(lon));
        fields.insert("latitude".to_string(), scalar(lat));
    }

    for name in [
        "label",
        "score",
        "type",
        "id",
        "housenumber",
        "name",
        "street",
        "postcode",
        "city",
        "context",
        "citycode",
        "oldcitycode",
        "oldcity",
        "district",
    ] {
        let value = &properties[name];
        if !value.is_null() {
            fields.insert(format!("result_{}", name), scalar(value));
        }
    }

    Some(fields)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::query_normalizer::normalize;
    use crate::domain::query::{QueryMode, RawQuery};
    use serde_json::json;

    struct StaticBackend(Result<Value>);

    #[async_trait]
    impl GeocodingBackend for StaticBackend {
        async fn search(&self, _query: &NormalizedQuery) -> Result<Value> {
            self.0.clone()
        }

        async fn reverse(&self, _query: &NormalizedQuery) -> Result<Value> {
            self.0.clone()
        }
    }

    fn query() -> NormalizedQuery {
        normalize(&RawQuery::from_pairs([("q", "8 bd du port")]), QueryMode::Geocode).unwrap()
    }

    fn feature_collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [2.290084, 49.897443]},
                "properties": {
                    "label": "8 Boulevard du Port 80000 Amiens",
                    "score": 0.9746,
                    "housenumber": "8",
                    "id": "80021_6590_00008",
                    "type": "housenumber",
                    "postcode": "80000",
                    "citycode": "80021",
                    "city": "Amiens",
                    "context": "80, Somme, Hauts-de-France",
                    "street": "Boulevard du Port"
                }
            }]
        })
    }

    #[test]
    fn test_result_fields_flatten_best_feature() {
        let fields = result_fields(&feature_collection()).unwrap();
        assert_eq!(fields["latitude"], "49.897443");
        assert_eq!(fields["longitude"], "2.290084");
        assert_eq!(fields["result_label"], "8 Boulevard du Port 80000 Amiens");
        assert_eq!(fields["result_score"], "0.9746");
        assert_eq!(fields["result_citycode"], "80021");
        assert!(!fields.contains_key("result_district"));
    }

    #[test]
    fn test_empty_feature_collection() {
        assert!(result_fields(&json!({"features": []})).is_none());
        assert!(result_fields(&json!({})).is_none());
    }

    #[test]
    fn test_outcome_fields() {
        let outcome = RowOutcome::NotFound;
        assert_eq!(outcome.field("result_status"), "not-found");
        assert_eq!(outcome.field("result_label"), "");
    }

    #[tokio::test]
    async fn test_match_and_miss() {
        let geocoder = BackendRowGeocoder::new(Arc::new(StaticBackend(Ok(feature_collection()))));
        let outcome = geocoder.geocode_row(&query()).await.unwrap();
        assert_eq!(outcome.status(), "ok");
        assert_eq!(outcome.field("result_city"), "Amiens");

        let geocoder = BackendRowGeocoder::new(Arc::new(StaticBackend(Ok(json!({"features": []})))));
        let outcome = geocoder.geocode_row(&query()).await.unwrap();
        assert_eq!(outcome, RowOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_client_errors_are_row_level() {
        let geocoder = BackendRowGeocoder::new(Arc::new(StaticBackend(Err(AppError::Upstream {
            status: Some(400),
            message: "Bad Request".to_string(),
        }))));
        assert_eq!(geocoder.geocode_row(&query()).await.unwrap(), RowOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_server_errors_abort() {
        let geocoder = BackendRowGeocoder::new(Arc::new(StaticBackend(Err(AppError::Upstream {
            status: None,
            message: "timeout".to_string(),
        }))));
        assert!(geocoder.geocode_row(&query()).await.is_err());
    }
}
