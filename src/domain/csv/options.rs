// ============================================================
// GEOCODE CSV OPTIONS
// ============================================================
// Per-request settings for a batch geocoding job

use serde::{Deserialize, Serialize};

/// Every column the geocode stage can append, in output order.
pub const RESULT_COLUMNS: [&str; 17] = [
    "latitude",
    "longitude",
    "result_label",
    "result_score",
    "result_type",
    "result_id",
    "result_housenumber",
    "result_name",
    "result_street",
    "result_postcode",
    "result_city",
    "result_context",
    "result_citycode",
    "result_oldcitycode",
    "result_oldcity",
    "result_district",
    "result_status",
];

/// Options for one CSV geocoding request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeCsvOptions {
    /// Input columns used to build each row's query. Empty means all of them.
    #[serde(default)]
    pub columns: Vec<String>,

    /// Result columns appended to each row. Empty means the whole catalogue.
    #[serde(default)]
    pub result_columns: Vec<String>,

    /// Fixed citycode filter applied to every row
    pub citycode: Option<String>,

    /// Fixed postcode filter applied to every row
    pub postcode: Option<String>,
}

impl GeocodeCsvOptions {
    /// Result columns this job will emit, resolved against the catalogue.
    pub fn effective_result_columns(&self) -> Vec<String> {
        if self.result_columns.is_empty() {
            RESULT_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            self.result_columns.clone()
        }
    }

    pub fn unknown_result_column(&self) -> Option<&str> {
        self.result_columns
            .iter()
            .map(String::as_str)
            .find(|c| !RESULT_COLUMNS.contains(c))
    }
}
