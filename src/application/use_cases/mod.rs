pub mod geocode;
pub mod geocode_csv;
pub mod query_normalizer;
