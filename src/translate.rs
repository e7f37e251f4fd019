use crate::session::FeedSession;
use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

const TRANSLATOR_URL: &str = "https://www.deepl.com/translator";
const RESULT_CLASS: &str = "lmt__translations_as_text__text_btn";

/// Translation contract. Implementations never fail outward: when the
/// external surface yields nothing, the original text comes back unchanged.
///
/// `&mut self` keeps at most one translation in flight; the backing session
/// is a single interactive resource and overlapping requests would corrupt
/// its state.
#[async_trait]
pub trait Translator: Send {
    async fn translate(&mut self, from: &str, to: &str, text: &str) -> String;
}

/// Polls the external translation surface through the shared session.
pub struct SurfaceTranslator<'a> {
    session: &'a FeedSession,
    max_attempts: u32,
    poll_interval: Duration,
}

impl<'a> SurfaceTranslator<'a> {
    pub fn new(session: &'a FeedSession) -> Self {
        Self {
            session,
            max_attempts: 30,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Shorten the polling cadence; used by tests.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn surface_url(from: &str, to: &str, encoded_text: &str) -> String {
        format!("{TRANSLATOR_URL}#{from}/{to}/{encoded_text}")
    }
}

#[async_trait]
impl Translator for SurfaceTranslator<'_> {
    async fn translate(&mut self, from: &str, to: &str, text: &str) -> String {
        let encoded = utf8_percent_encode(text, NON_ALPHANUMERIC).to_string();
        let url = Self::surface_url(from, to, &encoded);

        for attempt in 0..self.max_attempts {
            tokio::time::sleep(self.poll_interval).await;
            match self.session.get_text(&url).await {
                Ok(html) => {
                    if let Some(result) = extract_translation(&html) {
                        debug!("Translation materialized after {} polls", attempt + 1);
                        return result;
                    }
                }
                Err(e) => {
                    debug!("Translation poll {} failed: {}", attempt + 1, e);
                }
            }
        }

        warn!("Translation never materialized, falling back to original text");
        percent_decode_str(&encoded)
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| text.to_string())
    }
}

/// Pull the translated text out of the surface page, if it has materialized.
pub fn extract_translation(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(&format!(".{RESULT_CLASS}")).expect("valid selector");
    let text: String = doc.select(&selector).next()?.text().collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}
