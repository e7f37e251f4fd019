use crate::config::EndpointSpec;
use crate::session::FeedSession;
use crate::types::{Article, Result, Source, TriageError};
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

/// Crawl a list of RSS endpoints for one source. Endpoints flagged
/// `requires_login` run the sign-in flow first; the session cookie jar then
/// covers the remaining endpoints of the run.
pub async fn fetch_endpoints(
    session: &FeedSession,
    source: Source,
    endpoints: &[EndpointSpec],
    day: NaiveDate,
    feed_user: Option<&str>,
    feed_password: Option<&str>,
) -> Result<Vec<Article>> {
    let mut articles = Vec::new();

    for endpoint in endpoints {
        if endpoint.requires_login() {
            session.login(endpoint.url(), feed_user, feed_password).await;
        }
        let body = match session.get_text(endpoint.url()).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Skipping endpoint {}: {}", endpoint.url(), e);
                continue;
            }
        };

        match source {
            Source::Iop => articles.extend(parse_iop_feed(&body, day)?),
            Source::Elsevier => {
                for pending in parse_elsevier_feed(&body, day)? {
                    match resolve_elsevier_entry(session, pending).await {
                        Some(article) => articles.push(article),
                        None => continue,
                    }
                }
            }
            Source::Arxiv => {
                return Err(TriageError::Parse(
                    "arxiv is not an RSS source".to_string(),
                ))
            }
        }
    }

    Ok(articles)
}

/// Parse an IOP journal feed, keeping entries updated on the target day.
pub fn parse_iop_feed(xml: &str, day: NaiveDate) -> Result<Vec<Article>> {
    let feed = feed_rs::parser::parse(xml.as_bytes())
        .map_err(|e| TriageError::Parse(format!("IOP feed parse failed: {e}")))?;
    info!("{} articles are found in RSS feed", feed.entries.len());

    let mut articles = Vec::new();
    for entry in feed.entries {
        let Some(updated) = entry.updated.or(entry.published) else {
            continue;
        };
        if updated.date_naive() != day {
            debug!("Entry {} is outside the target day", entry.id);
            continue;
        }
        let Some(url) = entry.links.first().map(|l| l.href.clone()) else {
            continue;
        };
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.replace("\n ", ""))
            .unwrap_or_default();
        let abstract_text = entry
            .summary
            .as_ref()
            .map(|s| s.content.replace('\n', " "))
            .unwrap_or_default();
        if abstract_text.is_empty() {
            continue;
        }

        articles.push(Article {
            source: Source::Iop,
            id: iop_id(&entry.id),
            title,
            abstract_text,
            url,
            published: updated,
            authors: entry.authors.iter().map(|a| a.name.clone()).collect(),
            pdf_url: None,
        });
    }
    Ok(articles)
}

/// An Elsevier feed entry awaiting its per-entry page fetch.
#[derive(Debug, Clone)]
pub struct PendingElsevierEntry {
    pub entry_id: String,
    pub link: String,
    pub title: String,
    pub authors: Vec<String>,
    pub updated: DateTime<Utc>,
}

/// Parse an Elsevier journal feed. The feed-level updated date gates the
/// whole feed; entries inherit it, since per-entry dates are unreliable here.
pub fn parse_elsevier_feed(xml: &str, day: NaiveDate) -> Result<Vec<PendingElsevierEntry>> {
    let feed = feed_rs::parser::parse(xml.as_bytes())
        .map_err(|e| TriageError::Parse(format!("Elsevier feed parse failed: {e}")))?;
    info!("{} articles are found in RSS feed", feed.entries.len());

    let Some(updated) = feed.updated else {
        return Ok(Vec::new());
    };
    if updated.date_naive() != day {
        debug!("Feed updated {} is outside the target day", updated);
        return Ok(Vec::new());
    }

    let mut pending = Vec::new();
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            continue;
        };
        pending.push(PendingElsevierEntry {
            entry_id: entry.id.clone(),
            link,
            title: entry
                .title
                .as_ref()
                .map(|t| t.content.replace("\n ", ""))
                .unwrap_or_default(),
            authors: entry.authors.iter().map(|a| a.name.clone()).collect(),
            updated,
        });
    }
    Ok(pending)
}

/// Fetch the article landing page and scrape abstract and DOI. A failed
/// fetch or scrape skips this entry only, never the batch.
async fn resolve_elsevier_entry(
    session: &FeedSession,
    pending: PendingElsevierEntry,
) -> Option<Article> {
    let html = match session.get_text(&pending.link).await {
        Ok(html) => html,
        Err(e) => {
            warn!("Skipping entry {}: page fetch failed: {}", pending.link, e);
            return None;
        }
    };
    let Some((abstract_text, doi)) = scrape_abstract_and_doi(&html) else {
        warn!("Skipping entry {}: no abstract found", pending.link);
        return None;
    };
    debug!("Resolved DOI {} for {}", doi, pending.entry_id);

    Some(Article {
        source: Source::Elsevier,
        id: elsevier_id(&pending.entry_id),
        title: pending.title,
        abstract_text,
        url: pending.entry_id,
        published: pending.updated,
        authors: pending.authors,
        pdf_url: None,
    })
}

/// Pull the first abstract paragraph and the citation DOI out of an article
/// landing page.
pub fn scrape_abstract_and_doi(html: &str) -> Option<(String, String)> {
    let doc = Html::parse_document(html);
    let abstract_sel = Selector::parse("#abstracts p").expect("valid selector");
    let doi_sel = Selector::parse(r#"meta[name="citation_doi"]"#).expect("valid selector");

    let abstract_text = doc
        .select(&abstract_sel)
        .next()?
        .text()
        .collect::<String>()
        .replace('\n', " ")
        .trim()
        .to_string();
    let doi = doc
        .select(&doi_sel)
        .next()?
        .value()
        .attr("content")?
        .to_string();
    Some((abstract_text, doi))
}

/// IOP entry ids end in volume/article-number; join the last two segments.
pub fn iop_id(entry_id: &str) -> String {
    let parts: Vec<&str> = entry_id.trim_end_matches('/').rsplit('/').take(2).collect();
    parts.into_iter().rev().collect::<Vec<_>>().join("_")
}

/// Elsevier entry ids end in the PII; keep the last segment.
pub fn elsevier_id(entry_id: &str) -> String {
    entry_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(entry_id)
        .to_string()
}
