use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A query-string value as it arrives from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Absent,
    Single(String),
    List(Vec<String>),
}

impl QueryValue {
    /// Collapse to a single meaningful value.
    ///
    /// Repeated keys keep their last value; `""`, `"null"` and `"undefined"`
    /// count as absent.
    pub fn resolve(&self) -> Option<&str> {
        let value = match self {
            QueryValue::Absent => return None,
            QueryValue::Single(value) => value.as_str(),
            QueryValue::List(values) => values.last()?.as_str(),
        };

        match value {
            "" | "null" | "undefined" => None,
            other => Some(other),
        }
    }
}

/// Untyped query parameters keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuery {
    params: HashMap<String, QueryValue>,
}

impl RawQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ordered pairs; a key seen twice becomes a list.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut query = Self::new();
        for (key, value) in pairs {
            query.push(key, value);
        }
        query
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let slot = self.params.entry(key.into()).or_insert(QueryValue::Absent);
        *slot = match std::mem::replace(slot, QueryValue::Absent) {
            QueryValue::Absent => QueryValue::Single(value),
            QueryValue::Single(first) => QueryValue::List(vec![first, value]),
            QueryValue::List(mut values) => {
                values.push(value);
                QueryValue::List(values)
            }
        };
    }

    pub fn insert(&mut self, key: impl Into<String>, value: QueryValue) {
        self.params.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(QueryValue::resolve)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Geocode,
    Reverse,
}

impl QueryMode {
    pub fn allowed_keys(&self) -> &'static [QueryKey] {
        match self {
            QueryMode::Geocode => &[
                QueryKey::Q,
                QueryKey::Limit,
                QueryKey::Autocomplete,
                QueryKey::Lon,
                QueryKey::Lat,
                QueryKey::Type,
                QueryKey::Postcode,
                QueryKey::Citycode,
            ],
            QueryMode::Reverse => &[QueryKey::Lon, QueryKey::Lat, QueryKey::Limit, QueryKey::Type],
        }
    }

    pub fn allows(&self, key: QueryKey) -> bool {
        self.allowed_keys().contains(&key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKey {
    Q,
    Limit,
    Autocomplete,
    Lon,
    Lat,
    Type,
    Postcode,
    Citycode,
}

impl QueryKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKey::Q => "q",
            QueryKey::Limit => "limit",
            QueryKey::Autocomplete => "autocomplete",
            QueryKey::Lon => "lon",
            QueryKey::Lat => "lat",
            QueryKey::Type => "type",
            QueryKey::Postcode => "postcode",
            QueryKey::Citycode => "citycode",
        }
    }
}

/// Validated parameters, safe to forward to the geocoding backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedQuery {
    mode: QueryMode,
    params: BTreeMap<QueryKey, String>,
}

impl NormalizedQuery {
    pub(crate) fn new(mode: QueryMode, params: BTreeMap<QueryKey, String>) -> Self {
        Self { mode, params }
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn get(&self, key: QueryKey) -> Option<&str> {
        self.params.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Pairs ready for a query string.
    pub fn to_pairs(&self) -> Vec<(&'static str, &str)> {
        self.params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }
}
