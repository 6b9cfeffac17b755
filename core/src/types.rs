//! Core data types for restoquery
//!
//! These types are shared between the query engine, the cache backends and the CLI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Placeholder shown for a missing name or cuisine.
pub const UNKNOWN: &str = "Unknown";

/// A validated geographic point.
///
/// Latitude is within [-90, 90], longitude within [-180, 180], both finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = Error;

    fn try_from(raw: RawGeoPoint) -> Result<Self> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Restaurant identifier as found in source documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Read an identifier from a JSON value, accepting integers and strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) if !s.trim().is_empty() => Some(RecordId::Text(s.clone())),
            _ => None,
        }
    }

    /// Canonical string form used as the unique key in storage.
    pub fn as_key(&self) -> String {
        match self {
            RecordId::Int(n) => n.to_string(),
            RecordId::Text(s) => s.clone(),
        }
    }
}

/// Projection of a restaurant document used by the scanner.
///
/// # Fields
/// - `id`: Restaurant identifier, if the projection carried one.
/// - `name`: Display name; absent names show as "Unknown".
/// - `cuisine`: Cuisine label; absent cuisines show as "Unknown" and never match a filter.
/// - `location`: Position; records without one are excluded from results.
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantRecord {
    pub id: Option<RecordId>,
    pub name: Option<String>,
    pub cuisine: Option<String>,
    pub location: Option<GeoPoint>,
}

impl RestaurantRecord {
    /// Project a stored document onto `{id, name, cuisine, location}`.
    ///
    /// Coordinates are read from `address.coord.coordinates` as `[longitude, latitude]`.
    /// A bare `address.coord` array in the same order is accepted too. Missing or
    /// malformed coordinates leave `location` empty.
    pub fn from_document(doc: &Value) -> Self {
        let text = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_owned);

        Self {
            id: doc.get("restaurant_id").and_then(RecordId::from_value),
            name: text("name"),
            cuisine: text("cuisine"),
            location: document_location(doc),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn display_cuisine(&self) -> &str {
        self.cuisine.as_deref().unwrap_or(UNKNOWN)
    }
}

fn document_location(doc: &Value) -> Option<GeoPoint> {
    let coord = doc.get("address")?.get("coord")?;
    let pair = match coord {
        Value::Array(items) => items,
        _ => coord.get("coordinates")?.as_array()?,
    };
    if pair.len() < 2 {
        return None;
    }
    let longitude = pair[0].as_f64()?;
    let latitude = pair[1].as_f64()?;
    GeoPoint::new(latitude, longitude).ok()
}

/// Parameters of a k-nearest query; also the cache lookup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQueryParameters")]
pub struct QueryParameters {
    point: GeoPoint,
    k: usize,
    cuisine: Option<String>,
}

#[derive(Deserialize)]
struct RawQueryParameters {
    point: GeoPoint,
    k: usize,
    cuisine: Option<String>,
}

impl TryFrom<RawQueryParameters> for QueryParameters {
    type Error = Error;

    fn try_from(raw: RawQueryParameters) -> Result<Self> {
        QueryParameters::new(raw.point, raw.k, raw.cuisine)
    }
}

impl QueryParameters {
    /// Build query parameters.
    ///
    /// A blank cuisine means "no filter". `k` must be positive.
    pub fn new(point: GeoPoint, k: usize, cuisine: Option<String>) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidInput(
                "result count k must be positive".to_string(),
            ));
        }
        let cuisine = cuisine
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Ok(Self { point, k, cuisine })
    }

    pub fn point(&self) -> GeoPoint {
        self.point
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn cuisine(&self) -> Option<&str> {
        self.cuisine.as_deref()
    }
}

/// One row of a ranked answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub name: String,
    pub distance_km: f64,
    pub cuisine: String,
}

/// Where a served result list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Cache,
    Live,
}

impl ResultSource {
    /// Return the lowercase string representation used for reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::Cache => "cache",
            ResultSource::Live => "live",
        }
    }
}
