use crate::application::use_cases::query_normalizer::normalize;
use crate::domain::error::Result;
use crate::domain::query::{QueryMode, RawQuery};
use crate::infrastructure::addok::GeocodingBackend;
use serde_json::Value;
use std::sync::Arc;

pub struct GeocodeUseCase {
    backend: Arc<dyn GeocodingBackend + Send + Sync>,
}

impl GeocodeUseCase {
    pub fn new(backend: Arc<dyn GeocodingBackend + Send + Sync>) -> Self {
        Self { backend }
    }

    pub async fn search(&self, raw: &RawQuery) -> Result<Value> {
        let query = normalize(raw, QueryMode::Geocode)?;
        self.backend.search(&query).await
    }

    pub async fn reverse(&self, raw: &RawQuery) -> Result<Value> {
        let query = normalize(raw, QueryMode::Reverse)?;
        self.backend.reverse(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::domain::query::{NormalizedQuery, QueryKey};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(&'static str, NormalizedQuery)>>,
    }

    #[async_trait]
    impl GeocodingBackend for RecordingBackend {
        async fn search(&self, query: &NormalizedQuery) -> Result<Value> {
            self.calls.lock().unwrap().push(("search", query.clone()));
            Ok(json!({"features": []}))
        }

        async fn reverse(&self, query: &NormalizedQuery) -> Result<Value> {
            self.calls.lock().unwrap().push(("reverse", query.clone()));
            Ok(json!({"features": []}))
        }
    }

    #[tokio::test]
    async fn test_search_normalizes_before_calling() {
        let backend = Arc::new(RecordingBackend::default());
        let use_case = GeocodeUseCase::new(backend.clone());

        use_case
            .search(&RawQuery::from_pairs([("q", "foo"), ("q", "  bar "), ("x", "1")]))
            .await
            .unwrap();

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "search");
        assert_eq!(calls[0].1.get(QueryKey::Q), Some("bar"));
        assert_eq!(calls[0].1.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_query_never_reaches_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let use_case = GeocodeUseCase::new(backend.clone());

        let err = use_case
            .reverse(&RawQuery::from_pairs([("lon", "180"), ("lat", "0")]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(backend.calls.lock().unwrap().is_empty());
    }
}
