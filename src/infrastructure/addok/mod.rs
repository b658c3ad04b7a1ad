pub mod client;
pub mod row_geocoder;

use crate::domain::error::Result;
use crate::domain::query::NormalizedQuery;
use async_trait::async_trait;
use serde_json::Value;

pub use client::AddokClient;
pub use row_geocoder::{BackendRowGeocoder, RowGeocoder, RowOutcome};

/// Single-query geocoding backend
#[async_trait]
pub trait GeocodingBackend {
    async fn search(&self, query: &NormalizedQuery) -> Result<Value>;
    async fn reverse(&self, query: &NormalizedQuery) -> Result<Value>;
}
