// ============================================================
// CSV DOMAIN LAYER
// ============================================================
// Core types and value objects for batch CSV geocoding
// No I/O, no async

mod format;
mod options;

pub use format::{ColumnSeparator, DetectedFormat, LineSeparator, TextEncoding};
pub use options::{GeocodeCsvOptions, RESULT_COLUMNS};
