use crate::types::{Result, TriageError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One RSS endpoint. Plain strings in the config are accepted and default to
/// no login; endpoints behind an institutional gate set `requires_login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        requires_login: bool,
    },
}

impl EndpointSpec {
    pub fn url(&self) -> &str {
        match self {
            EndpointSpec::Url(u) => u,
            EndpointSpec::Detailed { url, .. } => url,
        }
    }

    pub fn requires_login(&self) -> bool {
        match self {
            EndpointSpec::Url(_) => false,
            EndpointSpec::Detailed { requires_login, .. } => *requires_login,
        }
    }
}

fn default_arxiv_offset() -> i64 {
    2
}

fn default_rss_offset() -> i64 {
    1
}

fn default_max_results() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// arXiv query topic, e.g. "cat:physics.optics".
    pub subject: String,
    /// Keyword -> weight, scored in this (insertion) order.
    pub keywords: IndexMap<String, f64>,
    pub score_threshold: f64,
    #[serde(default)]
    pub iop_rss_url: Vec<EndpointSpec>,
    #[serde(default)]
    pub elsevier_rss_url: Vec<EndpointSpec>,
    /// arXiv listings lag submission; target day is today minus this.
    #[serde(default = "default_arxiv_offset")]
    pub arxiv_window_offset_days: i64,
    /// RSS feeds update the day after publication; target day is today minus this.
    #[serde(default = "default_rss_offset")]
    pub rss_window_offset_days: i64,
    #[serde(default = "default_max_results")]
    pub arxiv_max_results: usize,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)
            .map_err(|e| TriageError::Config(format!("bad YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Fail fast before any network activity.
    fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(TriageError::Config("subject must not be empty".into()));
        }
        if self.keywords.is_empty() {
            return Err(TriageError::Config("keywords must not be empty".into()));
        }
        if let Some((word, weight)) = self.keywords.iter().find(|(_, w)| **w < 0.0) {
            return Err(TriageError::Config(format!(
                "keyword {word:?} has negative weight {weight}"
            )));
        }
        // Threshold must be positive so that "score >= threshold" alone
        // never accepts a zero-hit article.
        if self.score_threshold <= 0.0 {
            return Err(TriageError::Config(format!(
                "score_threshold must be > 0, got {}",
                self.score_threshold
            )));
        }
        Ok(())
    }
}

/// Credentials for external services. Environment variables take precedence;
/// CLI flags are the fallback.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub slack_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub feed_user: Option<String>,
    pub feed_password: Option<String>,
}

impl Credentials {
    pub fn resolve(
        slack_token: Option<String>,
        openai_api_key: Option<String>,
        feed_user: Option<String>,
        feed_password: Option<String>,
    ) -> Self {
        Self {
            slack_token: std::env::var("SLACK_BOT_TOKEN").ok().or(slack_token),
            openai_api_key: std::env::var("OPENAI_API").ok().or(openai_api_key),
            feed_user: std::env::var("ECS_ID").ok().or(feed_user),
            feed_password: std::env::var("ECS_PASSWORD").ok().or(feed_password),
        }
    }
}
