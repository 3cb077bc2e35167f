//! The on-disk datastore: one folder per anime plus two index copies.
//!
//! Layout, relative to the configured roots:
//!
//! ```text
//! {data_root}/{local_id}/info.json     entity metadata
//! {data_root}/{local_id}/points.json   pilgrimage points
//! {data_root}/{local_id}/images/*      mirrored images
//! {data_root}/index.json               read-projection
//! {root_dir}/index.json                second copy of the projection
//! {root_dir}/apiid.json                local_id -> external API id
//! ```
//!
//! The index is a pure projection: every write path regenerates it in full
//! from the folders instead of patching it, so it can always be rebuilt
//! after corruption.

pub mod index;
pub mod points;

pub use index::{Index, IndexEntry};
pub use points::PointsFile;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::models::{AnimeInfo, Point, RawAnimeInfo};

/// Last-resort local id when neither the data folders nor the apiid mapping
/// are readable. Matches the historical tail of the dataset so a broken
/// allocator cannot overwrite early entries.
const FALLBACK_LOCAL_ID: u32 = 5901;

/// Display color used when an entity has none recorded.
pub const DEFAULT_THEME_COLOR: &str = "#7f6a95";

#[derive(Debug, Clone)]
pub struct Store {
    data_root: PathBuf,
    root_dir: PathBuf,
    mirror_base: String,
}

impl Store {
    /// Opens the store, creating the data root and the seed files
    /// (`index.json`, `apiid.json`) when missing.
    pub fn open(data_root: &Path, root_dir: &Path, mirror_base: &str) -> Result<Self> {
        let store = Self {
            data_root: data_root.to_path_buf(),
            root_dir: root_dir.to_path_buf(),
            mirror_base: mirror_base.trim_end_matches('/').to_string(),
        };

        fs::create_dir_all(&store.data_root).with_context(|| {
            format!("Failed to create data root {}", store.data_root.display())
        })?;

        if !store.data_index_path().exists() {
            info!("index.json not found, creating an empty one");
            store.write_json(&store.data_index_path(), &Index::new())?;
        }
        if !store.apiid_path().exists() {
            info!("apiid.json not found, creating an empty one");
            store.write_json(&store.apiid_path(), &BTreeMap::<u32, i64>::new())?;
        }

        Ok(store)
    }

    pub fn entity_dir(&self, local_id: u32) -> PathBuf {
        self.data_root.join(local_id.to_string())
    }

    pub fn images_dir(&self, local_id: u32) -> PathBuf {
        self.entity_dir(local_id).join("images")
    }

    fn info_path(&self, local_id: u32) -> PathBuf {
        self.entity_dir(local_id).join("info.json")
    }

    fn points_path(&self, local_id: u32) -> PathBuf {
        self.entity_dir(local_id).join("points.json")
    }

    fn data_index_path(&self) -> PathBuf {
        self.data_root.join("index.json")
    }

    fn root_index_path(&self) -> PathBuf {
        self.root_dir.join("index.json")
    }

    fn apiid_path(&self) -> PathBuf {
        self.root_dir.join("apiid.json")
    }

    /// URL under the image mirror for one downloaded image.
    #[must_use]
    pub fn mirror_url(&self, local_id: u32, filename: &str) -> String {
        format!(
            "{}/pic/data/{}/images/{}",
            self.mirror_base, local_id, filename
        )
    }

    fn inform_url(&self, local_id: u32) -> String {
        format!("{}/pic/data/{}/points.json", self.mirror_base, local_id)
    }

    /// Next free local id: one past the highest of the numeric folder names
    /// and the apiid mapping keys. Ids are never reused, even for entities
    /// that have since disappeared from disk but still appear in the
    /// mapping.
    #[must_use]
    pub fn allocate_local_id(&self) -> u32 {
        match self.highest_known_id() {
            Ok(highest) => highest + 1,
            Err(e) => {
                error!(error = %e, "Failed to determine next local id, using fallback");
                FALLBACK_LOCAL_ID
            }
        }
    }

    fn highest_known_id(&self) -> Result<u32> {
        let mut highest = 0u32;
        for entry in fs::read_dir(&self.data_root)
            .with_context(|| format!("Failed to read {}", self.data_root.display()))?
        {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                highest = highest.max(id);
            }
        }

        let mapped = self.load_apiid()?.keys().max().copied().unwrap_or(0);
        Ok(highest.max(mapped))
    }

    /// Combined view of both index copies, the root copy taking precedence.
    /// A missing or unreadable copy is logged and ignored; resolution can
    /// still work off the other one.
    #[must_use]
    pub fn load_index(&self) -> Index {
        let mut combined = Index::new();
        for path in [self.data_index_path(), self.root_index_path()] {
            if !path.exists() {
                continue;
            }
            match read_json::<Index>(&path) {
                Ok(part) => {
                    debug!(path = %path.display(), entries = part.len(), "Loaded index");
                    combined.extend(part);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to load index copy"),
            }
        }
        combined
    }

    pub fn load_points(&self, local_id: u32) -> Result<PointsFile> {
        read_json(&self.points_path(local_id))
    }

    /// Persists a brand-new entity and refreshes the index projection.
    ///
    /// Image URLs in `info`/`points` are expected to be already rewritten to
    /// the mirror by the caller; the store only writes what it is given.
    pub fn create_entity(&self, info: &AnimeInfo, points: &[Point]) -> Result<()> {
        let local_id = info.local_id;
        fs::create_dir_all(self.images_dir(local_id)).with_context(|| {
            format!("Failed to create folder for local id {local_id}")
        })?;

        self.write_json(&self.info_path(local_id), info)?;
        self.write_json(&self.points_path(local_id), &points)?;

        info!(
            local_id,
            name = %info.name,
            name_cn = %info.name_cn,
            points = points.len(),
            "Created entity"
        );

        self.regenerate_index()?;
        Ok(())
    }

    /// Appends already-diffed points to an existing entity, preserving the
    /// on-disk `points.json` shape, then refreshes the index projection.
    /// Returns the combined point count.
    pub fn merge_points(&self, local_id: u32, new_points: Vec<Point>) -> Result<usize> {
        let added = new_points.len();
        let mut file = self
            .load_points(local_id)
            .with_context(|| format!("Failed to load points for local id {local_id}"))?;

        file.append(new_points);
        let total = file.len();
        self.write_json(&self.points_path(local_id), &file)?;

        self.update_points_length(local_id, total);

        info!(local_id, added, total, "Merged new points");

        self.regenerate_index()?;
        Ok(total)
    }

    /// Keeps `pointsLength` in `info.json` consistent when the field exists.
    /// The field is cosmetic, so failures are logged rather than propagated.
    fn update_points_length(&self, local_id: u32, total: usize) {
        let path = self.info_path(local_id);
        let result = read_json::<serde_json::Value>(&path).and_then(|mut value| {
            match value.get_mut("pointsLength") {
                Some(field) => {
                    *field = serde_json::json!(total);
                    self.write_json(&path, &value)
                }
                None => Ok(()),
            }
        });
        if let Err(e) = result {
            warn!(local_id, error = %e, "Failed to update pointsLength in info.json");
        }
    }

    /// Rebuilds the index from the entity folders and writes both copies.
    ///
    /// A folder only counts if it has both `info.json` and `points.json`;
    /// one corrupt folder is logged and skipped, never aborting the rest.
    /// Folders with no usable name are skipped unless a previous index
    /// already listed them, so an entry once published is never silently
    /// dropped. Both copies must be written for the call to succeed.
    pub fn regenerate_index(&self) -> Result<Index> {
        let prior: Index = if self.data_index_path().exists() {
            read_json(&self.data_index_path()).unwrap_or_else(|e| {
                warn!(error = %e, "Existing index.json unreadable, rebuilding from scratch");
                Index::new()
            })
        } else {
            Index::new()
        };

        let mut index = Index::new();

        let entries = fs::read_dir(&self.data_root)
            .with_context(|| format!("Failed to read {}", self.data_root.display()))?;
        for entry in entries.filter_map(std::result::Result::ok) {
            let Some(local_id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }
            if !self.info_path(local_id).exists() || !self.points_path(local_id).exists() {
                continue;
            }

            match self.derive_entry(local_id, &prior) {
                Ok(Some(derived)) => {
                    index.insert(local_id, derived);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(local_id, error = %e, "Skipping unreadable entity folder");
                }
            }
        }

        self.write_json(&self.data_index_path(), &index)?;
        self.write_json(&self.root_index_path(), &index)?;

        info!(entries = index.len(), "Index files regenerated");
        Ok(index)
    }

    fn derive_entry(&self, local_id: u32, prior: &Index) -> Result<Option<IndexEntry>> {
        let raw: RawAnimeInfo = read_json(&self.info_path(local_id))?;
        let points = self.load_points(local_id)?.into_points();

        let name = raw.display_name();
        let name_cn = raw.display_name_cn();
        if name.is_empty() && name_cn.is_empty() && !prior.contains_key(&local_id) {
            warn!(local_id, "Skipping folder with empty name fields");
            return Ok(None);
        }

        let cover = raw
            .cover
            .filter(|c| !c.is_empty())
            .map(|c| match image_filename(&c) {
                Some(filename) => self.mirror_url(local_id, &filename),
                None => c,
            })
            .unwrap_or_default();

        let theme_color = raw
            .theme_color
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_THEME_COLOR.to_string());

        Ok(Some(IndexEntry {
            name,
            name_cn,
            cover,
            theme_color,
            points,
            inform: self.inform_url(local_id),
        }))
    }

    pub fn load_apiid(&self) -> Result<BTreeMap<u32, i64>> {
        if !self.apiid_path().exists() {
            return Ok(BTreeMap::new());
        }
        read_json(&self.apiid_path())
    }

    /// Records which external API id a local entity came from.
    pub fn record_external_id(&self, local_id: u32, external_id: i64) -> Result<()> {
        let mut mapping = self.load_apiid()?;
        mapping.insert(local_id, external_id);
        self.write_json(&self.apiid_path(), &mapping)?;
        info!(local_id, external_id, "Updated apiid.json");
        Ok(())
    }

    pub fn find_local_by_external(&self, external_id: i64) -> Result<Option<u32>> {
        let mapping = self.load_apiid()?;
        Ok(mapping
            .into_iter()
            .find(|&(_, ext)| ext == external_id)
            .map(|(local, _)| local))
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let body = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", path.display()))?;
        fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse {}", path.display()))
}

/// The source URL without its query string; queries select resized
/// variants, and the mirror always stores the original.
#[must_use]
pub fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Filename component of an image URL, used as the name of the mirrored
/// file. `None` when the URL has no path component to name the file after.
#[must_use]
pub fn image_filename(url: &str) -> Option<String> {
    let base = strip_query(url);
    let path = Url::parse(base).map_or_else(|_| base.to_string(), |u| u.path().to_string());
    let name = path.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_filename_strips_query_and_path() {
        assert_eq!(
            image_filename("https://image.anitabi.cn/points/abc123.jpg?plan=h160"),
            Some("abc123.jpg".to_string())
        );
        assert_eq!(image_filename("https://example.com/"), None);
        assert_eq!(image_filename("not a url/pic.png"), Some("pic.png".to_string()));
    }

    #[test]
    fn strip_query_leaves_plain_urls_alone() {
        assert_eq!(strip_query("https://a/b.jpg"), "https://a/b.jpg");
        assert_eq!(strip_query("https://a/b.jpg?x=1"), "https://a/b.jpg");
    }
}
