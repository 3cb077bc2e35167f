use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One pilgrimage location belonging to an anime.
///
/// Points coming from the API carry a stable `id`; points coming from the
/// scrape feed usually do not, which is why the scrape path deduplicates by
/// coordinate instead. Fields this crate does not interpret are kept in
/// `extra` so a read-modify-write cycle never loses source data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Episode/scene label. The API sends a number, the scrape feed a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ep: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// `[latitude, longitude]`. Exactly `(0, 0)` means "coordinates not
    /// found", not a real location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<[f64; 2]>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Point {
    #[must_use]
    pub fn geo_or_origin(&self) -> (f64, f64) {
        self.geo.map_or((0.0, 0.0), |[lat, lng]| (lat, lng))
    }
}
