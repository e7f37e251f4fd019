use crate::session::FeedSession;
use crate::types::{Article, Result, Source, TriageError};
use chrono::NaiveDate;
use tracing::debug;
use url::Url;

const API_ENDPOINT: &str = "http://export.arxiv.org/api/query";

/// Build the windowed query string covering one submission day.
pub fn window_query(subject: &str, day: NaiveDate) -> String {
    let stamp = day.format("%Y%m%d");
    format!("({subject}) AND submittedDate:[{stamp}000000 TO {stamp}235959]")
}

/// Fetch all arXiv submissions for `day` matching `subject`, in one page
/// bounded by `max_results`.
pub async fn fetch_window(
    session: &FeedSession,
    subject: &str,
    day: NaiveDate,
    max_results: usize,
) -> Result<Vec<Article>> {
    let mut url = Url::parse(API_ENDPOINT)?;
    url.query_pairs_mut()
        .append_pair("search_query", &window_query(subject, day))
        .append_pair("max_results", &max_results.to_string())
        .append_pair("sortBy", "submittedDate")
        .append_pair("sortOrder", "descending");

    debug!("arXiv query: {}", url);
    let body = session.get_text(url.as_str()).await?;
    parse_response(&body, day)
}

/// Parse the Atom response, keeping entries published on the target day.
pub fn parse_response(atom: &str, day: NaiveDate) -> Result<Vec<Article>> {
    let feed = feed_rs::parser::parse(atom.as_bytes())
        .map_err(|e| TriageError::Parse(format!("arXiv Atom parse failed: {e}")))?;

    let mut articles = Vec::new();
    for entry in feed.entries {
        let Some(published) = entry.published else {
            continue;
        };
        if published.date_naive() != day {
            continue;
        }
        let title = match &entry.title {
            Some(t) => t.content.replace("\n ", ""),
            None => continue,
        };
        let abstract_text = entry
            .summary
            .as_ref()
            .map(|s| s.content.replace('\n', " "))
            .unwrap_or_default();
        if abstract_text.is_empty() {
            continue;
        }

        let pdf_url = entry
            .links
            .iter()
            .find(|l| l.media_type.as_deref() == Some("application/pdf"))
            .map(|l| l.href.clone())
            .or_else(|| {
                entry
                    .id
                    .contains("/abs/")
                    .then(|| entry.id.replace("/abs/", "/pdf/"))
            });

        articles.push(Article {
            source: Source::Arxiv,
            id: short_id(&entry.id),
            title,
            abstract_text,
            url: entry.id.clone(),
            published,
            authors: entry.authors.iter().map(|a| a.name.clone()).collect(),
            pdf_url,
        });
    }
    Ok(articles)
}

/// Derive the short identifier from the entry id URL, with dots mapped to
/// underscores so it is safe as a directory name.
pub fn short_id(entry_id: &str) -> String {
    entry_id
        .rsplit('/')
        .next()
        .unwrap_or(entry_id)
        .replace('.', "_")
}
