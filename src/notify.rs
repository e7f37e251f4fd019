use crate::types::{Result, ScoredArticle, TriageError};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{debug, warn};

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";
const FILE_UPLOAD_URL: &str = "https://slack.com/api/files.upload";

fn separator() -> String {
    "*".repeat(80)
}

/// Leading banner stating the run date and accepted-article count.
pub fn banner(date: NaiveDate, n_articles: usize) -> String {
    let star = separator();
    format!("{star}\n \t \t {date}\tnum of articles = {n_articles}\n{star}")
}

/// Break an abstract into quoted lines, one sentence per line. Unlike the
/// slide wrapper, the space after an English sentence boundary is kept.
fn quote_wrap(text: &str) -> String {
    let mut wrapped = text.replace(". ", ". \n>");
    wrapped = wrapped.replace('。', "。\n>");
    while wrapped.ends_with("\n>") {
        wrapped.truncate(wrapped.len() - 2);
    }
    wrapped
}

/// Per-article notification text: score, hit keywords, URL, title, then both
/// abstracts sentence-broken with quote markers, framed by the separator.
pub fn article_message(scored: &ScoredArticle, abstract_jp: &str) -> String {
    let article = &scored.article;
    let star = separator();
    let abstract_jp = quote_wrap(abstract_jp);
    let abstract_en = quote_wrap(&article.abstract_text);

    format!(
        "\n Score: `{}`\
         \n Hit keywords: `{:?}`\
         \n URL: {}\
         \n Title: {}\
         \n Abstract:\
         \n>{}\
         \n Original:\
         \n>{}\
         \n {}",
        scored.score, scored.hit_keywords, article.url, article.title, abstract_jp, abstract_en, star
    )
}

/// Notification transport. The banner returns a thread handle so per-article
/// messages can be threaded under it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_banner(&self, text: &str) -> Result<Option<String>>;
    async fn post_article(
        &self,
        text: &str,
        deck: Option<&Path>,
        thread_ts: Option<&str>,
    ) -> Result<()>;
}

/// Slack transport: `chat.postMessage` for text, `files.upload` for decks.
pub struct SlackNotifier {
    client: reqwest::Client,
    token: String,
    channel: String,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

impl SlackNotifier {
    pub fn new(token: String, channel: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            channel,
        }
    }

    async fn post_message(&self, text: &str, thread_ts: Option<&str>) -> Result<Option<String>> {
        let mut body = json!({
            "channel": self.channel,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let parsed: PostMessageResponse = response.json().await?;
        if !parsed.ok {
            return Err(TriageError::Notify(
                parsed.error.unwrap_or_else(|| "unknown Slack error".to_string()),
            ));
        }
        Ok(parsed.ts)
    }

    async fn upload_deck(
        &self,
        deck: &Path,
        comment: &str,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        let filename = deck
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("slide.pdf")
            .to_string();
        let bytes = tokio::fs::read(deck).await?;

        let mut form = reqwest::multipart::Form::new()
            .text("channels", self.channel.clone())
            .text("filename", filename.clone())
            .text("filetype", "pdf")
            .text("initial_comment", comment.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            );
        if let Some(ts) = thread_ts {
            form = form.text("thread_ts", ts.to_string());
        }

        let response = self
            .client
            .post(FILE_UPLOAD_URL)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let parsed: PostMessageResponse = response.json().await?;
        if !parsed.ok {
            return Err(TriageError::Notify(
                parsed.error.unwrap_or_else(|| "unknown Slack error".to_string()),
            ));
        }
        debug!("Uploaded deck {}", deck.display());
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post_banner(&self, text: &str) -> Result<Option<String>> {
        self.post_message(text, None).await
    }

    async fn post_article(
        &self,
        text: &str,
        deck: Option<&Path>,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        match deck {
            Some(deck) => {
                // Threading can fail on stale handles; retry unthreaded.
                if let Err(e) = self.upload_deck(deck, text, thread_ts).await {
                    warn!("Threaded upload failed ({}), retrying without thread", e);
                    self.upload_deck(deck, text, None).await?;
                }
                Ok(())
            }
            None => {
                if let Err(e) = self.post_message(text, thread_ts).await {
                    warn!("Threaded post failed ({}), retrying without thread", e);
                    self.post_message(text, None).await?;
                }
                Ok(())
            }
        }
    }
}
