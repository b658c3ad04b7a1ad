pub mod error;
pub mod query;

// CSV geocoding module
pub mod csv;
