pub mod assets;
pub mod config;
pub mod notify;
pub mod pipeline;
pub mod scoring;
pub mod session;
pub mod slides;
pub mod sources;
pub mod summarize;
pub mod translate;
pub mod types;

pub use assets::AssetLimits;
pub use config::{Config, Credentials, EndpointSpec};
pub use notify::{Notifier, SlackNotifier};
pub use pipeline::{DeckRenderer, MarpRenderer, RunReport};
pub use session::FeedSession;
pub use summarize::{ChatSummarizer, Summarizer};
pub use translate::{SurfaceTranslator, Translator};
pub use types::{Article, ScoredArticle, Source, SummaryDocument, TriageError};
