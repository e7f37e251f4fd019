use anyhow::Context;
use clap::Parser;
use paper_triage::assets::AssetLimits;
use paper_triage::config::{Config, Credentials};
use paper_triage::notify::{Notifier, SlackNotifier};
use paper_triage::pipeline::{self, MarpRenderer};
use paper_triage::summarize::{ChatSummarizer, Summarizer};
use paper_triage::translate::SurfaceTranslator;
use paper_triage::FeedSession;
use std::path::PathBuf;
use tracing::{info, warn};

/// Daily research-feed triage: score new articles against a keyword profile,
/// summarize the relevant ones, build slide decks, and post to Slack.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory for per-article output (PDF, images, deck).
    #[arg(long, default_value = "files")]
    out_dir: PathBuf,

    /// Slack channel to post into.
    #[arg(long, default_value = "#papers")]
    channel: String,

    /// Fallback credentials; environment variables take precedence
    /// (SLACK_BOT_TOKEN, OPENAI_API, ECS_ID, ECS_PASSWORD).
    #[arg(long)]
    slack_token: Option<String>,
    #[arg(long)]
    openai_api: Option<String>,
    #[arg(long)]
    ecs_id: Option<String>,
    #[arg(long)]
    ecs_password: Option<String>,
}

/// Sink used when no Slack token is configured; messages go to the log.
struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn post_banner(&self, text: &str) -> paper_triage::types::Result<Option<String>> {
        info!("{}", text);
        Ok(None)
    }

    async fn post_article(
        &self,
        text: &str,
        deck: Option<&std::path::Path>,
        _thread_ts: Option<&str>,
    ) -> paper_triage::types::Result<()> {
        info!("{}", text);
        if let Some(deck) = deck {
            info!("Deck written to {}", deck.display());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let credentials = Credentials::resolve(
        args.slack_token,
        args.openai_api,
        args.ecs_id,
        args.ecs_password,
    );

    let notifier: Box<dyn Notifier> = match &credentials.slack_token {
        Some(token) => Box::new(SlackNotifier::new(token.clone(), args.channel.clone())),
        None => {
            warn!("No Slack token configured, logging notifications instead");
            Box::new(LogNotifier)
        }
    };
    let summarizer: Option<Box<dyn Summarizer>> = match &credentials.openai_api_key {
        Some(key) => Some(Box::new(ChatSummarizer::new(key.clone()))),
        None => {
            warn!("No language-model API key configured, decks will be skipped");
            None
        }
    };

    // The translation surface shares the feed session; both live exactly as
    // long as this run.
    let session = FeedSession::new()?;
    let mut translator = SurfaceTranslator::new(&session);

    let report = pipeline::run(
        &config,
        &credentials,
        &session,
        &mut translator,
        summarizer.as_deref(),
        notifier.as_ref(),
        &MarpRenderer,
        &args.out_dir,
        &AssetLimits::default(),
    )
    .await?;

    info!(
        "Run for {} finished: {} candidates, {} accepted, {} decks",
        report.date, report.candidates, report.accepted, report.decks
    );
    Ok(())
}
