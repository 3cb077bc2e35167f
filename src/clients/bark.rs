use reqwest::Client;
use tracing::{debug, info, warn};

/// Push notifications via a Bark endpoint.
///
/// Notification delivery is strictly best effort. A run must never fail or
/// retry because the phone was unreachable, so every error path here is
/// log-only.
#[derive(Clone)]
pub struct BarkNotifier {
    client: Client,
    base_url: String,
    enabled: bool,
}

impl BarkNotifier {
    #[must_use]
    pub fn new(base_url: &str, enabled: bool) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            enabled,
        }
    }

    pub async fn notify(&self, title: &str, message: &str) {
        if !self.enabled {
            debug!(title, "Notifications disabled, skipping");
            return;
        }

        let url = format!(
            "{}/{}/{}",
            self.base_url,
            urlencoding::encode(title),
            urlencoding::encode(message)
        );

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(title, "Notification sent");
            }
            Ok(response) => {
                warn!(title, status = %response.status(), "Notification rejected");
            }
            Err(e) => {
                warn!(title, error = %e, "Failed to send notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_does_not_touch_the_network() {
        // An unroutable base URL would error if a request were attempted.
        let notifier = BarkNotifier::new("http://127.0.0.1:1", false);
        notifier.notify("title", "message").await;
    }
}
