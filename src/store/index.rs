use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Point;

/// Denormalized read-projection over all stored anime.
///
/// Keyed by `local_id`; `BTreeMap` keeps the file in ascending id order so
/// regenerating twice with no writes in between produces identical bytes.
/// serde_json writes the integer keys as JSON strings, matching the
/// existing files.
pub type Index = BTreeMap<u32, IndexEntry>;

/// One anime as it appears in `index.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub name_cn: String,

    #[serde(default)]
    pub cover: String,

    #[serde(default)]
    pub theme_color: String,

    #[serde(default)]
    pub points: Vec<Point>,

    /// URL under the image mirror where this anime's `points.json` is served.
    #[serde(default)]
    pub inform: String,
}
