//! Query normalization for the geocoding endpoints.
//!
//! Turns loosely-typed query parameters into a strict, allow-listed
//! [`NormalizedQuery`]. Rules are checked in a fixed order and the first
//! violation is reported as a [`AppError::Validation`].

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::error::{AppError, Result};
use crate::domain::query::{NormalizedQuery, QueryKey, QueryMode, RawQuery};

static POSTCODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d[AB\d]\d{3}$").unwrap());

static CITYCODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());

const PLACE_TYPES: [&str; 4] = ["housenumber", "street", "locality", "municipality"];

pub fn normalize(raw: &RawQuery, mode: QueryMode) -> Result<NormalizedQuery> {
    let mut params = BTreeMap::new();
    let value = |key: QueryKey| {
        if mode.allows(key) {
            raw.get(key.as_str())
        } else {
            None
        }
    };

    /* q */

    match value(QueryKey::Q) {
        Some(q) => {
            params.insert(QueryKey::Q, validate_q(q)?);
        }
        None if mode == QueryMode::Geocode => {
            return Err(AppError::validation("q is a required param"));
        }
        None => {}
    }

    /* limit */

    if let Some(limit) = value(QueryKey::Limit) {
        params.insert(QueryKey::Limit, validate_limit(limit)?);
    }

    /* autocomplete */

    if let Some(autocomplete) = value(QueryKey::Autocomplete) {
        let normalized = match autocomplete {
            "1" | "true" => "1",
            "0" | "false" => "0",
            _ => {
                return Err(AppError::validation(
                    "autocomplete must be a boolean value 0 or 1",
                ))
            }
        };
        params.insert(QueryKey::Autocomplete, normalized.to_string());
    }

    /* lon/lat */

    match (value(QueryKey::Lon), value(QueryKey::Lat)) {
        (Some(lon), Some(lat)) => {
            let (lon, lat) = validate_coordinates(lon, lat)?;
            params.insert(QueryKey::Lon, lon);
            params.insert(QueryKey::Lat, lat);
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(AppError::validation(
                "lon/lat must be present together if defined",
            ));
        }
        (None, None) if mode == QueryMode::Reverse => {
            return Err(AppError::validation("lon/lat are required params"));
        }
        (None, None) => {}
    }

    /* type */

    if let Some(place_type) = value(QueryKey::Type) {
        if !PLACE_TYPES.contains(&place_type) {
            return Err(AppError::validation(
                "type must be one of housenumber/street/locality/municipality",
            ));
        }
        params.insert(QueryKey::Type, place_type.to_string());
    }

    /* postcode */

    if let Some(postcode) = value(QueryKey::Postcode) {
        params.insert(QueryKey::Postcode, validate_postcode(postcode)?);
    }

    /* citycode */

    if let Some(citycode) = value(QueryKey::Citycode) {
        params.insert(QueryKey::Citycode, validate_citycode(citycode)?);
    }

    Ok(NormalizedQuery::new(mode, params))
}

pub fn validate_q(q: &str) -> Result<String> {
    let q = q.trim();
    if q.chars().count() < 3 || !is_first_char_valid(q) {
        return Err(AppError::validation(
            "q must contain at least 3 chars and start with a number or a letter",
        ));
    }
    Ok(q.to_string())
}

pub fn validate_postcode(postcode: &str) -> Result<String> {
    if !POSTCODE_PATTERN.is_match(postcode) {
        return Err(AppError::validation("postcode not valid"));
    }
    Ok(postcode.to_string())
}

pub fn validate_citycode(citycode: &str) -> Result<String> {
    if !CITYCODE_PATTERN.is_match(citycode) {
        return Err(AppError::validation("citycode not valid"));
    }
    Ok(citycode.to_string())
}

/// A digit, or a character whose lower and upper case forms differ.
fn is_first_char_valid(s: &str) -> bool {
    match s.chars().next() {
        Some(c) if c.is_ascii_digit() => true,
        Some(c) => c.to_lowercase().ne(c.to_uppercase()),
        None => false,
    }
}

fn validate_limit(limit: &str) -> Result<String> {
    match limit.trim().parse::<i64>() {
        Ok(n) if (1..=99).contains(&n) => Ok(n.to_string()),
        _ => Err(AppError::validation(
            "limit must be an integer between 1 and 99",
        )),
    }
}

fn validate_coordinates(lon: &str, lat: &str) -> Result<(String, String)> {
    let invalid = || AppError::validation("lon/lat must be valid WGS-84 coordinates");

    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;

    // Bounds are exclusive: the antimeridian and the poles are rejected.
    if !lon.is_finite() || !lat.is_finite() || lon <= -180.0 || lon >= 180.0 || lat <= -90.0 || lat >= 90.0
    {
        return Err(invalid());
    }

    Ok((lon.to_string(), lat.to_string()))
}
