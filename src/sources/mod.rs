pub mod arxiv;
pub mod rss;

use crate::config::Config;
use crate::session::FeedSession;
use crate::types::{Article, Result, Source};
use chrono::{Duration, NaiveDate, Utc};
use tracing::{info, warn};

/// The day articles must carry to survive the date filter, `offset_days`
/// before today (UTC).
pub fn target_day(offset_days: i64) -> NaiveDate {
    (Utc::now() - Duration::days(offset_days)).date_naive()
}

/// Run every configured source and gather candidate articles ready for
/// scoring. A source that fails wholesale is logged and skipped; the batch
/// continues with whatever the other sources produced.
pub async fn collect_candidates(
    session: &FeedSession,
    config: &Config,
    feed_user: Option<&str>,
    feed_password: Option<&str>,
) -> Result<Vec<Article>> {
    let mut articles = Vec::new();

    let arxiv_day = target_day(config.arxiv_window_offset_days);
    match arxiv::fetch_window(session, &config.subject, arxiv_day, config.arxiv_max_results).await
    {
        Ok(mut found) => {
            info!("arXiv returned {} candidates for {}", found.len(), arxiv_day);
            articles.append(&mut found);
        }
        Err(e) => warn!("arXiv query failed: {}", e),
    }

    let rss_day = target_day(config.rss_window_offset_days);
    for (source, endpoints) in [
        (Source::Iop, &config.iop_rss_url),
        (Source::Elsevier, &config.elsevier_rss_url),
    ] {
        if endpoints.is_empty() {
            continue;
        }
        match rss::fetch_endpoints(session, source, endpoints, rss_day, feed_user, feed_password)
            .await
        {
            Ok(mut found) => {
                info!("{} feeds returned {} candidates for {}", source, found.len(), rss_day);
                articles.append(&mut found);
            }
            Err(e) => warn!("{} feed crawl failed: {}", source, e),
        }
    }

    Ok(articles)
}
