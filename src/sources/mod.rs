//! Where daily update candidates come from.
//!
//! The daily job does not care whether a batch of recently updated anime was
//! produced by a headless browser scrape or anything else; it consumes
//! whatever an [`AnimeSource`] hands it. The one production source is a JSON
//! handoff file written by the external scraper.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::models::Point;

/// One recently updated anime as reported by a source, before it has been
/// matched against the local store.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Opaque key the source uses to find this candidate's points again.
    pub source_key: String,
    pub name: String,
    pub name_cn: String,
    pub cover: Option<String>,
}

#[async_trait]
pub trait AnimeSource {
    /// Up to `limit` candidates, most recently updated first.
    async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>>;

    /// The full point list the source observed for one candidate.
    async fn fetch_points(&self, candidate: &Candidate) -> Result<Vec<Point>>;
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    title: Option<String>,

    #[serde(default)]
    name_cn: Option<String>,

    #[serde(default)]
    cn: Option<String>,

    #[serde(default)]
    cover: Option<String>,

    #[serde(default)]
    points: Vec<Point>,

    #[serde(flatten)]
    _extra: Map<String, Value>,
}

impl FeedEntry {
    fn name(&self) -> String {
        pick(self.name.as_deref(), self.title.as_deref())
    }

    fn name_cn(&self) -> String {
        pick(self.name_cn.as_deref(), self.cn.as_deref())
    }
}

fn pick(canonical: Option<&str>, legacy: Option<&str>) -> String {
    canonical
        .filter(|s| !s.is_empty())
        .or_else(|| legacy.filter(|s| !s.is_empty()))
        .unwrap_or_default()
        .to_string()
}

/// Source backed by the scraper's JSON handoff file.
///
/// The file is an array ordered most recently updated first; entries may use
/// the legacy `title`/`cn` field spellings. Candidate keys are positions in
/// the array.
pub struct ScrapeFeedSource {
    path: PathBuf,
    entries: Vec<FeedEntry>,
}

impl ScrapeFeedSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scrape feed: {}", path.display()))?;
        let entries: Vec<FeedEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scrape feed: {}", path.display()))?;

        info!(path = %path.display(), entries = entries.len(), "Loaded scrape feed");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }
}

#[async_trait]
impl AnimeSource for ScrapeFeedSource {
    async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
        Ok(self
            .entries
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, entry)| Candidate {
                source_key: i.to_string(),
                name: entry.name(),
                name_cn: entry.name_cn(),
                cover: entry.cover.clone().filter(|c| !c.is_empty()),
            })
            .collect())
    }

    async fn fetch_points(&self, candidate: &Candidate) -> Result<Vec<Point>> {
        let index: usize = candidate
            .source_key
            .parse()
            .with_context(|| format!("Bad feed key: {}", candidate.source_key))?;
        let entry = self.entries.get(index).with_context(|| {
            format!(
                "Feed entry {} missing from {}",
                index,
                self.path.display()
            )
        })?;
        Ok(entry.points.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn feed_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn candidates_respect_feed_order_and_limit() {
        let file = feed_file(
            r#"[
                {"name": "first", "points": []},
                {"name": "second", "points": []},
                {"name": "third", "points": []}
            ]"#,
        );
        let source = ScrapeFeedSource::load(file.path()).unwrap();

        let candidates = source.list_candidates(2).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "first");
        assert_eq!(candidates[1].name, "second");
    }

    #[tokio::test]
    async fn legacy_spellings_are_normalized() {
        let file = feed_file(r#"[{"title": "old name", "cn": "旧名", "points": []}]"#);
        let source = ScrapeFeedSource::load(file.path()).unwrap();

        let candidates = source.list_candidates(10).await.unwrap();
        assert_eq!(candidates[0].name, "old name");
        assert_eq!(candidates[0].name_cn, "旧名");
    }

    #[tokio::test]
    async fn points_come_back_for_the_matching_entry() {
        let file = feed_file(
            r#"[
                {"name": "a", "points": [{"id": "p1"}]},
                {"name": "b", "points": [{"id": "p2"}, {"id": "p3"}]}
            ]"#,
        );
        let source = ScrapeFeedSource::load(file.path()).unwrap();

        let candidates = source.list_candidates(10).await.unwrap();
        let points = source.fetch_points(&candidates[1]).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "p2");
    }
}
