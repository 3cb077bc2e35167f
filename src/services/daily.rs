//! The daily reconciliation pass over recently updated anime.

use anyhow::Result;
use tracing::{info, warn};

use crate::diff;
use crate::models::AnimeInfo;
use crate::resolve;
use crate::services::ImageService;
use crate::sources::{AnimeSource, Candidate};
use crate::store::Store;

#[derive(Debug, Default)]
pub struct DailyOutcome {
    pub checked: usize,
    pub updated: Vec<(u32, usize)>,
    pub created: Vec<(u32, String)>,
    pub failed: usize,
}

impl DailyOutcome {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.updated.is_empty() || !self.created.is_empty()
    }

    #[must_use]
    pub fn summary_message(&self) -> String {
        let added: usize = self.updated.iter().map(|(_, n)| n).sum();
        format!(
            "Checked {} anime: {} new entries, {} updated with {} new points, {} failures",
            self.checked,
            self.created.len(),
            self.updated.len(),
            added,
            self.failed
        )
    }
}

/// Walks a source's candidates and folds each one into the store.
pub struct DailyUpdateService<S> {
    source: S,
    store: Store,
    images: ImageService,
}

impl<S: AnimeSource> DailyUpdateService<S> {
    #[must_use]
    pub fn new(source: S, store: Store, images: ImageService) -> Self {
        Self {
            source,
            store,
            images,
        }
    }

    /// One failing candidate never aborts the run; it is logged and counted,
    /// and the pass moves on.
    pub async fn run(&self, limit: usize) -> Result<DailyOutcome> {
        let candidates = self.source.list_candidates(limit).await?;
        info!(candidates = candidates.len(), "Starting daily update pass");

        let mut outcome = DailyOutcome::default();
        for candidate in &candidates {
            if candidate.name.is_empty() && candidate.name_cn.is_empty() {
                warn!("Skipping candidate with no usable name");
                continue;
            }

            outcome.checked += 1;
            match self.process(candidate).await {
                Ok(CandidateResult::Updated { local_id, added }) if added > 0 => {
                    outcome.updated.push((local_id, added));
                }
                Ok(CandidateResult::Created { local_id }) => {
                    outcome.created.push((local_id, candidate.name.clone()));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        name = %candidate.name,
                        name_cn = %candidate.name_cn,
                        error = %e,
                        "Failed to process candidate"
                    );
                    outcome.failed += 1;
                }
            }
        }

        info!(
            checked = outcome.checked,
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            failed = outcome.failed,
            "Daily update pass finished"
        );
        Ok(outcome)
    }

    async fn process(&self, candidate: &Candidate) -> Result<CandidateResult> {
        // Reload per candidate so entities created earlier in this same run
        // are visible to resolution.
        let index = self.store.load_index();

        match resolve::resolve(&candidate.name, &candidate.name_cn, &index) {
            Some(local_id) => self.update_existing(candidate, local_id).await,
            None => self.create_new(candidate).await,
        }
    }

    async fn update_existing(
        &self,
        candidate: &Candidate,
        local_id: u32,
    ) -> Result<CandidateResult> {
        let observed = self.source.fetch_points(candidate).await?;
        let existing = self.store.load_points(local_id)?;

        // Scraped points carry no stable ids; coordinates are the only
        // cross-run identity available.
        let mut fresh = diff::diff_by_coordinate(existing.points(), &observed);
        if fresh.is_empty() {
            info!(local_id, name = %candidate.name, "No new points");
            return Ok(CandidateResult::Updated { local_id, added: 0 });
        }

        self.images.mirror_point_images(&mut fresh, local_id).await;
        let added = fresh.len();
        self.store.merge_points(local_id, fresh)?;

        Ok(CandidateResult::Updated { local_id, added })
    }

    async fn create_new(&self, candidate: &Candidate) -> Result<CandidateResult> {
        let mut points = self.source.fetch_points(candidate).await?;
        let local_id = self.store.allocate_local_id();

        let mut info = AnimeInfo {
            local_id,
            name: candidate.name.clone(),
            name_cn: candidate.name_cn.clone(),
            cover: candidate.cover.clone(),
            points_length: Some(points.len()),
            ..AnimeInfo::default()
        };

        self.images.mirror_cover(&mut info, local_id).await;
        self.images.mirror_point_images(&mut points, local_id).await;

        self.store.create_entity(&info, &points)?;
        Ok(CandidateResult::Created { local_id })
    }
}

enum CandidateResult {
    Updated { local_id: u32, added: usize },
    Created { local_id: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point;
    use async_trait::async_trait;

    struct FixedSource {
        candidates: Vec<Candidate>,
        points: Vec<Point>,
    }

    #[async_trait]
    impl AnimeSource for FixedSource {
        async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
            Ok(self.candidates.iter().take(limit).cloned().collect())
        }

        async fn fetch_points(&self, _candidate: &Candidate) -> Result<Vec<Point>> {
            Ok(self.points.clone())
        }
    }

    fn point(id: &str, lat: f64, lng: f64) -> Point {
        Point {
            id: id.to_string(),
            geo: Some([lat, lng]),
            ..Point::default()
        }
    }

    fn service(dir: &std::path::Path, source: FixedSource) -> DailyUpdateService<FixedSource> {
        let store = Store::open(
            &dir.join("pic/data"),
            dir,
            "https://mirror.example",
        )
        .unwrap();
        let images = ImageService::new(store.clone());
        DailyUpdateService::new(source, store, images)
    }

    #[tokio::test]
    async fn unknown_candidate_becomes_a_new_entity() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixedSource {
            candidates: vec![Candidate {
                source_key: "0".to_string(),
                name: "brand new show".to_string(),
                name_cn: String::new(),
                cover: None,
            }],
            points: vec![point("p1", 35.0, 139.0)],
        };

        let service = service(dir.path(), source);
        let outcome = service.run(50).await.unwrap();

        assert_eq!(outcome.created.len(), 1);
        let (local_id, _) = outcome.created[0];
        let stored = service.store.load_points(local_id).unwrap();
        assert_eq!(stored.len(), 1);

        let index = service.store.load_index();
        assert_eq!(index[&local_id].name, "brand new show");
    }

    #[tokio::test]
    async fn known_candidate_only_gains_unseen_coordinates() {
        let dir = tempfile::tempdir().unwrap();

        let seed = FixedSource {
            candidates: vec![Candidate {
                source_key: "0".to_string(),
                name: "existing show".to_string(),
                name_cn: String::new(),
                cover: None,
            }],
            points: vec![point("p1", 35.0, 139.0)],
        };
        let service = service(dir.path(), seed);
        service.run(50).await.unwrap();

        // Second pass observes the old point plus one new coordinate.
        let second = FixedSource {
            candidates: vec![Candidate {
                source_key: "0".to_string(),
                name: "existing show".to_string(),
                name_cn: String::new(),
                cover: None,
            }],
            points: vec![point("p1", 35.0, 139.0), point("p2", 36.0, 140.0)],
        };
        let service = DailyUpdateService::new(
            second,
            service.store.clone(),
            ImageService::new(service.store.clone()),
        );
        let outcome = service.run(50).await.unwrap();

        assert!(outcome.created.is_empty());
        assert_eq!(outcome.updated.len(), 1);
        let (local_id, added) = outcome.updated[0];
        assert_eq!(added, 1);
        assert_eq!(service.store.load_points(local_id).unwrap().len(), 2);
    }
}
