//! Mirroring of remote images into entity folders.
//!
//! URL rewriting and downloading are deliberately decoupled: metadata always
//! points at the mirror, even when a download fails, because the mirror can
//! be backfilled later while a published upstream URL would go stale for
//! good.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, warn};

use crate::models::{AnimeInfo, Point};
use crate::store::{self, Store};

const DOWNLOAD_RETRIES: u32 = 5;
const DOWNLOAD_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Pause after each successful download.
const POLITENESS_DELAY: Duration = Duration::from_millis(500);

pub struct ImageService {
    client: Client,
    store: Store,
}

impl ImageService {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            client: Client::new(),
            store,
        }
    }

    /// Rewrites the cover URL to the mirror and downloads the original
    /// alongside. The rewrite always happens; the download is best effort.
    pub async fn mirror_cover(&self, info: &mut AnimeInfo, local_id: u32) {
        let Some(cover) = info.cover.clone().filter(|c| !c.is_empty()) else {
            return;
        };
        let Some(filename) = store::image_filename(&cover) else {
            warn!(local_id, cover = %cover, "Cover URL has no filename, leaving it as is");
            return;
        };

        info.cover = Some(self.store.mirror_url(local_id, &filename));
        self.fetch_to_folder(&cover, local_id, &filename).await;
    }

    /// Same contract as [`mirror_cover`](Self::mirror_cover), applied to each
    /// point's image.
    pub async fn mirror_point_images(&self, points: &mut [Point], local_id: u32) {
        for point in points {
            let Some(image) = point.image.clone().filter(|i| !i.is_empty()) else {
                continue;
            };
            let Some(filename) = store::image_filename(&image) else {
                warn!(local_id, image = %image, "Point image URL has no filename, leaving it as is");
                continue;
            };

            point.image = Some(self.store.mirror_url(local_id, &filename));
            self.fetch_to_folder(&image, local_id, &filename).await;
        }
    }

    async fn fetch_to_folder(&self, url: &str, local_id: u32, filename: &str) {
        let dir = self.store.images_dir(local_id);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(local_id, error = %e, "Failed to create images folder");
            return;
        }

        let dest = dir.join(filename);
        if let Err(e) = self.download(url, &dest).await {
            warn!(url, dest = %dest.display(), error = %e, "Image download failed");
        }
    }

    /// Downloads one image, skipping work already done. The source URL is
    /// fetched without its query string so the mirror stores the original
    /// rather than a resized variant.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.exists() {
            debug!(dest = %dest.display(), "Image already mirrored, skipping");
            return Ok(());
        }

        let source = store::strip_query(url);
        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=DOWNLOAD_RETRIES {
            match self.try_download(source, dest).await {
                Ok(()) => {
                    tokio::time::sleep(POLITENESS_DELAY).await;
                    return Ok(());
                }
                Err(e) if attempt == DOWNLOAD_RETRIES => return Err(e),
                Err(e) => {
                    warn!(url = source, attempt, error = %e, "Download failed, retrying in {}s", backoff.as_secs());
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(DOWNLOAD_BACKOFF_CAP);
                }
            }
        }

        unreachable!("retry loop always returns on its last attempt")
    }

    async fn try_download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Image fetch returned {} for {}", response.status(), url);
        }

        let bytes = response.bytes().await?;
        std::fs::write(dest, &bytes)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        debug!(dest = %dest.display(), bytes = bytes.len(), "Image mirrored");
        Ok(())
    }
}
