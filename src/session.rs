use crate::types::{Result, TriageError};
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared stateful HTTP session used for feed fetching, login, and the
/// translation surface. One session exists per run; it is owned by the
/// pipeline and passed by reference, never shared across tasks.
pub struct FeedSession {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl FeedSession {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("paper-triage/0.1")
            .timeout(Duration::from_secs(30))
            .cookie_store(true)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET a page body, retrying transient failures with exponential backoff.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: self.retry_delay,
            initial_interval: self.retry_delay,
            max_interval: self.retry_delay * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(self.retry_delay * 20),
            ..Default::default()
        };

        let mut last_error: Option<TriageError> = None;
        for attempt in 0..=self.max_retries {
            match self.try_get_text(url).await {
                Ok(body) => {
                    debug!("Fetched {} ({} bytes)", url, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| TriageError::Parse(format!("fetch failed for {url}"))))
    }

    async fn try_get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TriageError::Parse(format!(
                "HTTP {} fetching {}",
                status, url
            )));
        }
        Ok(response.text().await?)
    }

    /// GET raw bytes without retry, for PDF downloads.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TriageError::Parse(format!(
                "HTTP {} fetching {}",
                status, url
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Best-effort institutional login through the endpoint's sign-in form.
    ///
    /// Failures are logged and swallowed: some feeds stay readable without a
    /// session, and the caller proceeds to fetch regardless. The cookie jar
    /// keeps any session established here alive for the rest of the run.
    pub async fn login(&self, url: &str, user: Option<&str>, password: Option<&str>) {
        let (Some(user), Some(password)) = (user, password) else {
            warn!("No feed credentials configured, skipping login for {}", url);
            return;
        };

        info!("Logging in via {}", url);
        let form = [("username", user), ("password", password)];
        match self.client.post(url).form(&form).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Login form accepted at {}", url);
            }
            Ok(response) => {
                warn!("Login at {} returned HTTP {}", url, response.status());
            }
            Err(e) => {
                warn!("Login at {} failed: {}", url, e);
            }
        }
    }
}
