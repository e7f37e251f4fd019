use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where an article was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Arxiv,
    Iop,
    Elsevier,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Arxiv => write!(f, "arxiv"),
            Source::Iop => write!(f, "iop"),
            Source::Elsevier => write!(f, "elsevier"),
        }
    }
}

/// One discovered paper, normalized across sources. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub source: Source,
    /// Stable short identifier, safe for use as a directory name.
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    pub url: String,
    pub published: DateTime<Utc>,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
}

/// An article that passed the keyword filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredArticle {
    pub article: Article,
    /// Sum of matched keyword weights.
    pub score: f64,
    /// Matched keywords in weight-map order, not match order in text.
    pub hit_keywords: Vec<String>,
}

/// Structured summary built from the summarization response.
///
/// Fields are populated by matching the five fixed Japanese labels at line
/// start; a response missing some labels yields a partial document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub title: String,
    pub title_jp: String,
    pub keywords: String,
    pub problem: String,
    pub method: String,
    pub result: String,
    /// Glossary lines appearing after the 結果 label, possibly empty.
    pub terminology: Vec<String>,
    pub abstract_text: String,
    pub abstract_jp: String,
    pub year: String,
    pub entry_id: String,
    pub pdf_path: Option<PathBuf>,
}

impl SummaryDocument {
    /// True when none of the five labeled fields were recognized.
    pub fn is_empty(&self) -> bool {
        self.title_jp.is_empty()
            && self.keywords.is_empty()
            && self.problem.is_empty()
            && self.method.is_empty()
            && self.result.is_empty()
    }
}

/// An image pulled out of a source PDF.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub name: String,
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    pub ext: String,
}

/// A tabular region rendered to a Markdown fragment.
#[derive(Debug, Clone)]
pub struct ExtractedTable {
    pub page: u32,
    pub markdown: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("PDF asset extraction failed: {0}")]
    Asset(String),

    #[error("Slide rendering failed: {0}")]
    Render(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TriageError {
    /// Whether the pipeline should skip the current item and continue,
    /// rather than abort the run. Only configuration errors are fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TriageError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_errors_are_fatal() {
        assert!(!TriageError::Config("bad threshold".into()).is_recoverable());
        assert!(TriageError::Parse("truncated feed".into()).is_recoverable());
        assert!(TriageError::Notify("channel_not_found".into()).is_recoverable());
    }
}
