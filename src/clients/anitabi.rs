use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, warn};

use crate::models::{AnimeInfo, Point, RawAnimeInfo};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Retry schedule for interactive lookups: patient, the run is long anyway.
const LOOKUP_RETRIES: u32 = 5;
const LOOKUP_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Retry schedule for the wide id scan: fail fast, an id that keeps erroring
/// is treated as invalid rather than stalling hundreds of workers.
const SCAN_RETRIES: u32 = 3;
const SCAN_BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Client for the upstream pilgrimage-location API.
#[derive(Clone)]
pub struct AnitabiClient {
    client: Client,
    base_url: String,
}

impl AnitabiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches the lite metadata record for one external id.
    ///
    /// Returns `Ok(None)` on 404. Legacy field spellings in the response are
    /// folded into the canonical ones.
    pub async fn bangumi_lite(&self, external_id: i64) -> Result<Option<AnimeInfo>> {
        let url = format!("{}/bangumi/{}/lite", self.base_url, external_id);
        let Some(body) = self
            .get_with_retry(&url, LOOKUP_RETRIES, LOOKUP_BACKOFF_CAP)
            .await?
        else {
            return Ok(None);
        };

        let raw: RawAnimeInfo = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse lite info for id {external_id}"))?;
        Ok(Some(raw.canonical()))
    }

    /// Fetches the full point list for one external id, restricted to points
    /// that carry an image.
    pub async fn bangumi_points(&self, external_id: i64) -> Result<Option<Vec<Point>>> {
        let url = format!(
            "{}/bangumi/{}/points/detail?haveImage=true",
            self.base_url, external_id
        );
        let Some(body) = self
            .get_with_retry(&url, LOOKUP_RETRIES, LOOKUP_BACKOFF_CAP)
            .await?
        else {
            return Ok(None);
        };

        let points: Vec<Point> = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse points for id {external_id}"))?;
        Ok(Some(points))
    }

    /// Probes one external id during the monthly scan.
    ///
    /// An id counts as valid when it has at least one point and its lite
    /// record carries a name. Any error is treated as invalid; the scan
    /// tolerates false negatives but must never stall.
    pub async fn check_id(&self, external_id: i64) -> Option<i64> {
        let points_url = format!(
            "{}/bangumi/{}/points/detail?haveImage=true",
            self.base_url, external_id
        );
        let body = match self
            .get_with_retry(&points_url, SCAN_RETRIES, SCAN_BACKOFF_CAP)
            .await
        {
            Ok(Some(body)) => body,
            Ok(None) => return None,
            Err(e) => {
                debug!(external_id, error = %e, "Point probe failed");
                return None;
            }
        };

        let points: Vec<Point> = match serde_json::from_str(&body) {
            Ok(points) => points,
            Err(_) => return None,
        };
        if points.is_empty() {
            return None;
        }

        let lite_url = format!("{}/bangumi/{}/lite", self.base_url, external_id);
        let body = match self
            .get_with_retry(&lite_url, SCAN_RETRIES, SCAN_BACKOFF_CAP)
            .await
        {
            Ok(Some(body)) => body,
            Ok(None) => return None,
            Err(e) => {
                debug!(external_id, error = %e, "Lite probe failed");
                return None;
            }
        };

        let raw: RawAnimeInfo = match serde_json::from_str(&body) {
            Ok(raw) => raw,
            Err(_) => return None,
        };
        if raw.canonical().has_name() {
            Some(external_id)
        } else {
            None
        }
    }

    /// GET with exponential backoff starting at one second.
    ///
    /// `Ok(None)` means a definite 404; other non-success statuses are
    /// retried and the last one reported as an error.
    async fn get_with_retry(
        &self,
        url: &str,
        max_attempts: u32,
        backoff_cap: Duration,
    ) -> Result<Option<String>> {
        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=max_attempts {
            match self.client.get(url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Ok(None);
                }
                Ok(response) if response.status().is_success() => {
                    return Ok(Some(response.text().await?));
                }
                Ok(response) => {
                    if attempt == max_attempts {
                        anyhow::bail!("API error {} for {}", response.status(), url);
                    }
                    warn!(
                        url,
                        status = %response.status(),
                        attempt,
                        "Request failed, retrying in {}s",
                        backoff.as_secs()
                    );
                }
                Err(e) => {
                    if attempt == max_attempts {
                        return Err(e).with_context(|| format!("Request failed: {url}"));
                    }
                    warn!(url, error = %e, attempt, "Request failed, retrying in {}s", backoff.as_secs());
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(backoff_cap);
        }

        unreachable!("retry loop always returns on its last attempt")
    }
}
