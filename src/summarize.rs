use crate::types::{Article, Result, ScoredArticle, SummaryDocument, TriageError};
use async_trait::async_trait;
use chrono::Datelike;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const PROMPT: &str = "与えられた論文の要点をまとめ、以下の項目で日本語で出力せよ。それぞれの項目は最大でも180文字以内に要約せよ。

論文名:タイトルの日本語訳
キーワード:この論文のキーワード
課題:この論文が解決する課題
手法:この論文が提案する手法
結果:提案手法によって得られた結果

さらに要約内に登場する主要な専門用語について、高校生にもわかるような説明を付け加えよ。日本語だけでなく、翻訳元の英語表記も添えよ。それぞれの用語について、説明の終わりにのみ改行記号を用いよ。
";

/// Summarization contract: title + abstract in, labeled free text out.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<String>;
}

/// Chat-completions client. A fixed delay follows every call to respect the
/// provider's rate limits.
pub struct ChatSummarizer {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    post_call_delay: Duration,
}

impl ChatSummarizer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: CHAT_ENDPOINT.to_string(),
            model: "gpt-4-turbo".to_string(),
            post_call_delay: Duration::from_secs(30),
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_post_call_delay(mut self, delay: Duration) -> Self {
        self.post_call_delay = delay;
        self
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<String> {
        let text = format!("title: {title}\nbody: {abstract_text}");
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": PROMPT},
                {"role": "user", "content": text},
            ],
            "temperature": 0.25,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tokio::time::sleep(self.post_call_delay).await;
            return Err(TriageError::Summarization(format!(
                "chat completion returned HTTP {status}"
            )));
        }
        let parsed: ChatResponse = response.json().await?;
        tokio::time::sleep(self.post_call_delay).await;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TriageError::Summarization("empty choices array".to_string()))
    }
}

/// The five field labels, in response order.
const LABELS: [(&str, SummaryField); 5] = [
    ("論文名", SummaryField::TitleJp),
    ("キーワード", SummaryField::Keywords),
    ("課題", SummaryField::Problem),
    ("手法", SummaryField::Method),
    ("結果", SummaryField::Result),
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum SummaryField {
    TitleJp,
    Keywords,
    Problem,
    Method,
    Result,
}

/// Match a field label at line start and return the value after it, with any
/// separator colon stripped.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(label)?;
    let rest = rest
        .strip_prefix('：')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest);
    Some(rest.trim())
}

/// Parse the labeled response into a (possibly partial) summary document.
///
/// A small state machine over lines: the five labels assign fields while
/// scanning; once the 結果 label has been seen, every following non-empty
/// line accumulates into the terminology list. A response missing markers
/// yields a partial document rather than an error.
pub fn parse_summary(response: &str) -> SummaryDocument {
    let mut doc = SummaryDocument::default();
    let mut awaiting_terminology = false;

    for line in response.lines() {
        let line = line.trim();
        if awaiting_terminology {
            if !line.is_empty() {
                doc.terminology.push(line.replace('`', ""));
            }
            continue;
        }
        for (label, field) in LABELS {
            if let Some(value) = strip_label(line, label) {
                match field {
                    SummaryField::TitleJp => doc.title_jp = value.to_string(),
                    SummaryField::Keywords => doc.keywords = value.to_string(),
                    SummaryField::Problem => doc.problem = value.to_string(),
                    SummaryField::Method => doc.method = value.to_string(),
                    SummaryField::Result => {
                        doc.result = value.to_string();
                        awaiting_terminology = true;
                    }
                }
                break;
            }
        }
    }

    if doc.is_empty() {
        warn!("Summarization response carried none of the expected labels");
    } else {
        debug!("Parsed summary with {} terminology lines", doc.terminology.len());
    }
    doc
}

/// Attach article metadata and the translated abstract to a parsed summary.
pub fn build_document(
    scored: &ScoredArticle,
    summary_response: &str,
    abstract_jp: String,
) -> SummaryDocument {
    let article: &Article = &scored.article;
    let mut doc = parse_summary(summary_response);
    doc.title = article.title.clone();
    doc.abstract_text = article.abstract_text.clone();
    doc.abstract_jp = abstract_jp;
    doc.year = article.published.year().to_string();
    doc.entry_id = article.url.clone();
    doc
}
