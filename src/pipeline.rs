use crate::assets::{self, AssetLimits};
use crate::config::{Config, Credentials};
use crate::notify::{self, Notifier};
use crate::scoring;
use crate::session::FeedSession;
use crate::slides;
use crate::sources;
use crate::summarize::{self, Summarizer};
use crate::translate::Translator;
use crate::types::{Article, Result, ScoredArticle};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Renders a written deck to its shareable form. External collaborator; the
/// default shells out to marp.
#[async_trait]
pub trait DeckRenderer: Send + Sync {
    async fn render(&self, md_path: &Path) -> Result<PathBuf>;
}

pub struct MarpRenderer;

#[async_trait]
impl DeckRenderer for MarpRenderer {
    async fn render(&self, md_path: &Path) -> Result<PathBuf> {
        slides::render_deck(md_path).await
    }
}

/// What one batch pass produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub date: NaiveDate,
    pub candidates: usize,
    pub accepted: usize,
    pub decks: usize,
}

/// One full batch pass: collect, filter, enrich, notify. The session is the
/// run's single shared resource; the caller owns it for exactly this scope
/// and it is released when that scope ends, success or not.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: &Config,
    credentials: &Credentials,
    session: &FeedSession,
    translator: &mut (dyn Translator + '_),
    summarizer: Option<&(dyn Summarizer + '_)>,
    notifier: &dyn Notifier,
    renderer: &dyn DeckRenderer,
    out_dir: &Path,
    limits: &AssetLimits,
) -> Result<RunReport> {
    let candidates = sources::collect_candidates(
        session,
        config,
        credentials.feed_user.as_deref(),
        credentials.feed_password.as_deref(),
    )
    .await?;

    process_candidates(
        candidates,
        config,
        session,
        translator,
        summarizer,
        notifier,
        renderer,
        out_dir,
        limits,
    )
    .await
}

/// Score, filter, and sequentially process the candidate list. Split from
/// [`run`] so the triage stages can be driven without live sources.
#[allow(clippy::too_many_arguments)]
pub async fn process_candidates(
    candidates: Vec<Article>,
    config: &Config,
    session: &FeedSession,
    translator: &mut (dyn Translator + '_),
    summarizer: Option<&(dyn Summarizer + '_)>,
    notifier: &dyn Notifier,
    renderer: &dyn DeckRenderer,
    out_dir: &Path,
    limits: &AssetLimits,
) -> Result<RunReport> {
    let n_candidates = candidates.len();
    let mut accepted: Vec<ScoredArticle> = Vec::new();
    for article in candidates {
        let (score, hit_keywords) = scoring::calc_score(&article.abstract_text, &config.keywords);
        if !scoring::accepts(score, config.score_threshold) {
            continue;
        }
        accepted.push(ScoredArticle {
            article,
            score,
            hit_keywords,
        });
    }
    // Descending by score; per-article processing and notification follow
    // this order.
    accepted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let today = Utc::now().date_naive();
    info!("{} of {} candidates accepted", accepted.len(), n_candidates);

    let thread_ts = match notifier.post_banner(&notify::banner(today, accepted.len())).await {
        Ok(ts) => ts,
        Err(e) => {
            warn!("Banner post failed: {}", e);
            None
        }
    };

    let mut decks = 0;
    for scored in &accepted {
        // One article at a time: the translation session is a single
        // interactive resource.
        let abstract_jp = translator
            .translate("en", "ja", &scored.article.abstract_text)
            .await;
        let message = notify::article_message(scored, &abstract_jp);

        let deck = match summarizer {
            Some(summarizer) => {
                build_deck(scored, abstract_jp, summarizer, session, renderer, out_dir, limits)
                    .await
            }
            None => None,
        };
        if deck.is_some() {
            decks += 1;
        }

        if let Err(e) = notifier
            .post_article(&message, deck.as_deref(), thread_ts.as_deref())
            .await
        {
            warn!("Notification failed for {}: {}", scored.article.id, e);
        }
    }

    Ok(RunReport {
        date: today,
        candidates: n_candidates,
        accepted: accepted.len(),
        decks,
    })
}

/// Summarize one accepted article and synthesize its deck. Every failure
/// degrades to `None`: the article is still notified with score, keywords,
/// and abstracts, just without a deck.
async fn build_deck(
    scored: &ScoredArticle,
    abstract_jp: String,
    summarizer: &(dyn Summarizer + '_),
    session: &FeedSession,
    renderer: &dyn DeckRenderer,
    out_dir: &Path,
    limits: &AssetLimits,
) -> Option<PathBuf> {
    let article = &scored.article;
    let response = match summarizer
        .summarize(&article.title, &article.abstract_text)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!("Summarization failed for {}: {}", article.id, e);
            return None;
        }
    };

    let mut doc = summarize::build_document(scored, &response, abstract_jp);
    if doc.is_empty() {
        warn!("Summary for {} carried no recognizable fields, skipping deck", article.id);
        return None;
    }

    let dir = out_dir.join(&article.id);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Cannot create {}: {}", dir.display(), e);
        return None;
    }

    // Download the PDF when the source offers one; otherwise a pre-placed
    // file under the article directory is picked up.
    let pdf_path = dir.join(format!("{}.pdf", article.id));
    if let Some(pdf_url) = &article.pdf_url {
        match session.get_bytes(pdf_url).await {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&pdf_path, bytes) {
                    warn!("Cannot write PDF for {}: {}", article.id, e);
                }
            }
            Err(e) => warn!("PDF download failed for {}: {}", article.id, e),
        }
    }

    let (images, tables) = if pdf_path.exists() {
        doc.pdf_path = Some(pdf_path.clone());
        let images = match assets::extract_images(&pdf_path, &dir, limits) {
            Ok(images) => images,
            Err(e) => {
                warn!("Image extraction failed for {}: {}", article.id, e);
                Vec::new()
            }
        };
        let tables = match assets::extract_tables(&pdf_path, limits.max_num) {
            Ok(tables) => tables,
            Err(e) => {
                warn!("Table extraction failed for {}: {}", article.id, e);
                Vec::new()
            }
        };
        (images, tables)
    } else {
        info!("No PDF for {}, deck will carry text sections only", article.id);
        (Vec::new(), Vec::new())
    };

    let deck_text = slides::compose_deck(&doc, &images, &tables);
    let md_path = dir.join(format!("{}.md", article.id));
    if let Err(e) = std::fs::write(&md_path, &deck_text) {
        warn!("Cannot write deck text for {}: {}", article.id, e);
        return None;
    }

    match renderer.render(&md_path).await {
        Ok(rendered) => Some(rendered),
        Err(e) => {
            warn!("Deck rendering failed for {}: {}", article.id, e);
            None
        }
    }
}
