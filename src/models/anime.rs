use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-anime metadata as it appears in an `info.json` file or an API
/// response, before field names are normalized.
///
/// Older files written by earlier tooling use `title`/`cn` where newer ones
/// use `name`/`name_cn`. All variant handling happens here, in one place:
/// [`RawAnimeInfo::canonical`] collapses the spellings so the rest of the
/// crate only ever sees `name`/`name_cn`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnimeInfo {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub name_cn: Option<String>,

    #[serde(default)]
    pub cn: Option<String>,

    #[serde(default)]
    pub cover: Option<String>,

    #[serde(default)]
    pub theme_color: Option<String>,

    #[serde(default, rename = "pointsLength")]
    pub points_length: Option<usize>,

    #[serde(default)]
    pub local_id: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawAnimeInfo {
    /// Display name, preferring the canonical spelling over the legacy one.
    #[must_use]
    pub fn display_name(&self) -> String {
        non_empty(self.name.as_deref())
            .or_else(|| non_empty(self.title.as_deref()))
            .unwrap_or_default()
            .to_string()
    }

    #[must_use]
    pub fn display_name_cn(&self) -> String {
        non_empty(self.name_cn.as_deref())
            .or_else(|| non_empty(self.cn.as_deref()))
            .unwrap_or_default()
            .to_string()
    }

    #[must_use]
    pub fn canonical(self) -> AnimeInfo {
        let name = self.display_name();
        let name_cn = self.display_name_cn();
        AnimeInfo {
            local_id: self.local_id.unwrap_or_default(),
            name,
            name_cn,
            cover: self.cover,
            theme_color: self.theme_color,
            points_length: self.points_length,
            extra: self.extra,
        }
    }
}

/// Canonical per-anime metadata, persisted as `info.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimeInfo {
    #[serde(default)]
    pub local_id: u32,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub name_cn: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,

    #[serde(
        default,
        rename = "pointsLength",
        skip_serializing_if = "Option::is_none"
    )]
    pub points_length: Option<usize>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnimeInfo {
    /// An anime without either name cannot be matched against the index and
    /// is not worth storing.
    #[must_use]
    pub fn has_name(&self) -> bool {
        !self.name.is_empty() || !self.name_cn.is_empty()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
