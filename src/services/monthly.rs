//! The monthly wide scan against the upstream API.
//!
//! Two phases: a concurrent probe of the whole external id range to find ids
//! worth looking at, then a sequential pass that matches each valid id
//! against the local store, appending points to known anime and creating
//! folders for unknown ones.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{info, warn};

use crate::clients::AnitabiClient;
use crate::diff;
use crate::models::{AnimeInfo, Point};
use crate::resolve;
use crate::services::ImageService;
use crate::store::Store;

/// Pause between sequential lookups and after each entity write.
const LOOKUP_DELAY: Duration = Duration::from_millis(500);
const WRITE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct MonthlyOutcome {
    pub new_anime_ids: Vec<i64>,
    pub updated_anime_ids: Vec<i64>,
    pub local_id_range: Option<(u32, u32)>,
    pub scanned_count: usize,
}

impl MonthlyOutcome {
    #[must_use]
    pub fn summary_message(&self) -> String {
        let mut summary = format!("Scan finished: {} valid API ids", self.scanned_count);
        if !self.new_anime_ids.is_empty() {
            summary.push_str(&format!(
                ", {} new anime added (API ids {})",
                self.new_anime_ids.len(),
                join_ids(&self.new_anime_ids)
            ));
        }
        if let Some((first, last)) = self.local_id_range {
            summary.push_str(&format!(", local ids {first}-{last}"));
        }
        if !self.updated_anime_ids.is_empty() {
            summary.push_str(&format!(
                ", {} existing anime gained points (API ids {})",
                self.updated_anime_ids.len(),
                join_ids(&self.updated_anime_ids)
            ));
        }
        summary
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Scan report persisted next to the index files for later inspection.
#[derive(Debug, Serialize)]
struct ScanReport {
    total_checked: usize,
    total_valid: usize,
    valid_ids: Vec<i64>,
    check_time: String,
}

pub struct MonthlyUpdateService {
    client: AnitabiClient,
    store: Store,
    images: ImageService,
    concurrency: usize,
    report_path: PathBuf,
}

impl MonthlyUpdateService {
    #[must_use]
    pub fn new(
        client: AnitabiClient,
        store: Store,
        images: ImageService,
        concurrency: usize,
        report_path: PathBuf,
    ) -> Self {
        Self {
            client,
            store,
            images,
            concurrency,
            report_path,
        }
    }

    pub async fn run(&self, start_id: i64, end_id: i64) -> Result<MonthlyOutcome> {
        // Config::validate covers the config values; this guards the CLI
        // overrides too.
        if start_id > end_id {
            anyhow::bail!("API id range is inverted: start_id {start_id} > end_id {end_id}");
        }

        let valid_ids = self.scan_ids(start_id, end_id).await?;

        let mut outcome = MonthlyOutcome {
            scanned_count: valid_ids.len(),
            ..MonthlyOutcome::default()
        };

        let mut next_local_id = self.store.allocate_local_id();
        let first_local_id = next_local_id;

        for (i, &external_id) in valid_ids.iter().enumerate() {
            info!(
                external_id,
                index = i + 1,
                total = valid_ids.len(),
                "Processing API id"
            );

            if let Err(e) = self
                .process_id(external_id, &mut next_local_id, &mut outcome)
                .await
            {
                warn!(external_id, error = %e, "Failed to process API id");
            }

            tokio::time::sleep(LOOKUP_DELAY).await;
        }

        if next_local_id > first_local_id {
            outcome.local_id_range = Some((first_local_id, next_local_id - 1));
        }

        self.store.regenerate_index()?;
        info!("{}", outcome.summary_message());
        Ok(outcome)
    }

    /// Probes every id in the range with bounded concurrency and records the
    /// sorted survivors in the scan report.
    async fn scan_ids(&self, start_id: i64, end_id: i64) -> Result<Vec<i64>> {
        let total = usize::try_from(end_id - start_id + 1).unwrap_or(usize::MAX);
        info!(start_id, end_id, concurrency = self.concurrency, "Scanning API id range");

        let mut valid_ids: Vec<i64> = stream::iter(start_id..=end_id)
            .map(|id| self.client.check_id(id))
            .buffer_unordered(self.concurrency)
            .filter_map(|result| async move { result })
            .collect()
            .await;
        valid_ids.sort_unstable();

        info!(valid = valid_ids.len(), checked = total, "Scan complete");

        let report = ScanReport {
            total_checked: total,
            total_valid: valid_ids.len(),
            valid_ids: valid_ids.clone(),
            check_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let body = serde_json::to_string_pretty(&report)?;
        std::fs::write(&self.report_path, body)
            .with_context(|| format!("Failed to write {}", self.report_path.display()))?;

        Ok(valid_ids)
    }

    async fn process_id(
        &self,
        external_id: i64,
        next_local_id: &mut u32,
        outcome: &mut MonthlyOutcome,
    ) -> Result<()> {
        let Some(info) = self.client.bangumi_lite(external_id).await? else {
            info!(external_id, "No metadata for id, skipping");
            return Ok(());
        };
        if !info.has_name() {
            warn!(external_id, "API returned a record without names, skipping");
            return Ok(());
        }

        let index = self.store.load_index();
        match resolve::resolve(&info.name, &info.name_cn, &index) {
            Some(_) => {
                // Known anime. The apiid mapping, not the name match, decides
                // which folder to touch.
                match self.store.find_local_by_external(external_id)? {
                    Some(local_id) => {
                        let added = self.update_existing(external_id, local_id).await?;
                        if added > 0 {
                            outcome.updated_anime_ids.push(external_id);
                        }
                    }
                    None => {
                        warn!(
                            external_id,
                            name = %info.name,
                            "Anime matched by name but has no apiid mapping, skipping"
                        );
                    }
                }
            }
            None => {
                if self.create_new(external_id, info, *next_local_id).await? {
                    outcome.new_anime_ids.push(external_id);
                    *next_local_id += 1;
                    tokio::time::sleep(WRITE_DELAY).await;
                }
            }
        }
        Ok(())
    }

    /// Appends points the store has not seen yet. API points carry stable
    /// ids, so the diff runs on ids. Returns the number added.
    async fn update_existing(&self, external_id: i64, local_id: u32) -> Result<usize> {
        let existing = self.store.load_points(local_id)?;
        let Some(observed) = self.client.bangumi_points(external_id).await? else {
            info!(external_id, local_id, "No point data from API");
            return Ok(0);
        };

        let mut fresh = diff::diff_by_id(existing.points(), &observed);
        if fresh.is_empty() {
            info!(external_id, local_id, "No new points");
            return Ok(0);
        }

        self.images.mirror_point_images(&mut fresh, local_id).await;
        let added = fresh.len();
        self.store.merge_points(local_id, fresh)?;
        info!(external_id, local_id, added, "Existing anime updated");
        Ok(added)
    }

    /// Saves an unmatched anime under a fresh local id. An anime without
    /// points is not worth a folder; returns whether one was created.
    async fn create_new(
        &self,
        external_id: i64,
        info: AnimeInfo,
        local_id: u32,
    ) -> Result<bool> {
        let Some(points) = self.client.bangumi_points(external_id).await? else {
            info!(external_id, "No point data from API, not creating entity");
            return Ok(false);
        };
        if points.is_empty() {
            info!(external_id, "Id has no points, not creating entity");
            return Ok(false);
        }

        self.persist_new(external_id, info, points, local_id).await?;
        Ok(true)
    }

    /// Writes the entity folder and records the apiid mapping.
    ///
    /// Once `create_entity` has succeeded the folder exists and the local id
    /// is burned, so a failed mapping write must not propagate: the caller
    /// advances its id counter on `Ok`, and reusing the id would overwrite
    /// the entity just written.
    async fn persist_new(
        &self,
        external_id: i64,
        mut info: AnimeInfo,
        mut points: Vec<Point>,
        local_id: u32,
    ) -> Result<()> {
        info.local_id = local_id;
        info.points_length = Some(points.len());

        self.images.mirror_cover(&mut info, local_id).await;
        self.images.mirror_point_images(&mut points, local_id).await;

        self.store.create_entity(&info, &points)?;
        if let Err(e) = self.store.record_external_id(local_id, external_id) {
            warn!(
                external_id,
                local_id,
                error = %e,
                "Failed to record apiid mapping for new entity"
            );
        }

        info!(
            external_id,
            local_id,
            name = %info.name,
            points = points.len(),
            "New anime saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &std::path::Path) -> MonthlyUpdateService {
        let store = Store::open(&dir.join("pic/data"), dir, "https://mirror.example").unwrap();
        let images = ImageService::new(store.clone());
        // Unroutable base; these tests never reach the network.
        let client = AnitabiClient::new("http://127.0.0.1:9").unwrap();
        MonthlyUpdateService::new(client, store, images, 1, dir.join("valid_api_ids.json"))
    }

    fn anime(name: &str) -> AnimeInfo {
        AnimeInfo {
            name: name.to_string(),
            ..AnimeInfo::default()
        }
    }

    fn point(id: &str) -> Vec<Point> {
        vec![Point {
            id: id.to_string(),
            ..Point::default()
        }]
    }

    #[tokio::test]
    async fn apiid_write_failure_still_burns_the_local_id() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        // A directory in place of apiid.json makes every mapping write fail
        // while entity folder writes keep working.
        std::fs::remove_file(dir.path().join("apiid.json")).unwrap();
        std::fs::create_dir(dir.path().join("apiid.json")).unwrap();

        let mut next_local_id = service.store.allocate_local_id();
        for (external_id, name) in [(100, "Show A"), (200, "Show B")] {
            service
                .persist_new(external_id, anime(name), point(&format!("p{external_id}")), next_local_id)
                .await
                .unwrap();
            next_local_id += 1;
        }

        // Two folders, and the first entity was not overwritten.
        let index = service.store.load_index();
        assert_eq!(index.len(), 2);
        let mut names: Vec<&str> = index.values().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["Show A", "Show B"]);
    }

    #[tokio::test]
    async fn inverted_id_range_is_rejected_before_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let result = service.run(10, 5).await;
        assert!(result.is_err());
        // No scan happened, so no report was written.
        assert!(!dir.path().join("valid_api_ids.json").exists());
    }

    #[test]
    fn summary_lists_ids_and_local_range() {
        let outcome = MonthlyOutcome {
            new_anime_ids: vec![443163, 443200],
            updated_anime_ids: vec![100521],
            local_id_range: Some((5902, 5903)),
            scanned_count: 3,
        };

        let summary = outcome.summary_message();
        assert!(summary.contains("3 valid API ids"));
        assert!(summary.contains("2 new anime added (API ids 443163, 443200)"));
        assert!(summary.contains("local ids 5902-5903"));
        assert!(summary.contains("1 existing anime gained points (API ids 100521)"));
    }
}
