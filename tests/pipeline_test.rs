use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use paper_triage::assets::AssetLimits;
use paper_triage::config::Config;
use paper_triage::notify::Notifier;
use paper_triage::pipeline::{self, DeckRenderer};
use paper_triage::summarize::Summarizer;
use paper_triage::translate::Translator;
use paper_triage::types::{Article, Result, Source};
use paper_triage::FeedSession;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CONFIG: &str = r#"
subject: cat:quant-ph
keywords:
  quantum: 2.0
  graph: 1.5
score_threshold: 2.0
"#;

struct EchoTranslator;

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(&mut self, _from: &str, _to: &str, text: &str) -> String {
        format!("訳文。{text}")
    }
}

struct FixedSummarizer;

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _title: &str, _abstract_text: &str) -> Result<String> {
        Ok("論文名：グラフに基づく量子アルゴリズム\n\
            キーワード：量子計算, グラフ理論\n\
            課題：探索の高速化\n\
            手法：量子ウォーク\n\
            結果：二乗の高速化を達成\n\
            量子ウォーク (quantum walk): ランダムウォークの量子版。"
            .to_string())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    banner: Mutex<Option<String>>,
    articles: Mutex<Vec<(String, Option<PathBuf>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post_banner(&self, text: &str) -> Result<Option<String>> {
        *self.banner.lock().unwrap() = Some(text.to_string());
        Ok(Some("1700000000.000100".to_string()))
    }

    async fn post_article(
        &self,
        text: &str,
        deck: Option<&Path>,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        assert_eq!(thread_ts, Some("1700000000.000100"));
        self.articles
            .lock()
            .unwrap()
            .push((text.to_string(), deck.map(Path::to_path_buf)));
        Ok(())
    }
}

struct FileRenderer;

#[async_trait]
impl DeckRenderer for FileRenderer {
    async fn render(&self, md_path: &Path) -> Result<PathBuf> {
        let stem = md_path.file_stem().unwrap().to_str().unwrap();
        let output = md_path.with_file_name(format!("{stem}_slide.pdf"));
        std::fs::write(&output, b"%PDF-1.4 rendered deck")?;
        Ok(output)
    }
}

fn candidate(id: &str, title: &str, abstract_text: &str) -> Article {
    Article {
        source: Source::Arxiv,
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
        url: format!("http://arxiv.org/abs/{id}"),
        published: Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap(),
        authors: vec!["A. Author".to_string()],
        pdf_url: None,
    }
}

/// Minimal one-page PDF written through lopdf, standing in for the article's
/// downloaded source.
fn write_sample_pdf(path: &Path) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("Quantum walks on graphs")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn noise_rgb(width: u32, height: u32) -> Vec<u8> {
    // Incompressible pixel data, so the encoded images clear the size filter.
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..width as usize * height as usize * 3)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 33) as u8
        })
        .collect()
}

fn raw_image_stream(width: u32, height: u32) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        noise_rgb(width, height),
    )
}

/// Two-page PDF with two embedded figures; the first figure is referenced
/// from both pages.
fn write_pdf_with_figures(path: &Path) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let shared_img = doc.add_object(raw_image_stream(500, 500));
    let second_img = doc.add_object(raw_image_stream(450, 450));

    let media_box = || vec![0.into(), 0.into(), 595.into(), 842.into()];
    let page1 = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "ImA" => shared_img, "ImB" => second_img },
        },
        "MediaBox" => media_box(),
    });
    let page2 = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "ImA" => shared_img },
        },
        "MediaBox" => media_box(),
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page1.into(), page2.into()],
        "Count" => 2,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[tokio::test]
async fn one_relevant_article_yields_one_deck() {
    let config = Config::from_yaml(CONFIG).unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    // The accepted article's PDF is already in place, as after a manual
    // download for a non-arXiv source.
    let article_dir = out_dir.path().join("2405_01234v1");
    std::fs::create_dir_all(&article_dir).unwrap();
    write_sample_pdf(&article_dir.join("2405_01234v1.pdf"));

    let candidates = vec![
        candidate(
            "2405_01234v1",
            "A Graph-based Quantum Algorithm",
            "We study quantum walks on graphs.",
        ),
        candidate("2405_09999v1", "Unrelated paper", "Nothing relevant here."),
    ];

    let session = FeedSession::new().unwrap();
    let mut translator = EchoTranslator;
    let summarizer = FixedSummarizer;
    let notifier = RecordingNotifier::default();

    let report = pipeline::process_candidates(
        candidates,
        &config,
        &session,
        &mut translator,
        Some(&summarizer),
        &notifier,
        &FileRenderer,
        out_dir.path(),
        &AssetLimits::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.decks, 1);

    // Banner announces the count before any per-article message.
    let banner = notifier.banner.lock().unwrap().clone().unwrap();
    assert!(banner.contains("num of articles = 1"));

    let articles = notifier.articles.lock().unwrap();
    assert_eq!(articles.len(), 1);
    let (message, deck) = &articles[0];
    assert!(message.contains(" Score: `3.5`"));
    assert!(message.contains(r#"`["quantum", "graph"]`"#));
    assert!(message.contains(">訳文。"));

    // The rendered deck exists next to the deck text, and the deck text
    // carries all five summary fields.
    let deck = deck.clone().unwrap();
    assert!(deck.ends_with("2405_01234v1/2405_01234v1_slide.pdf"));
    assert!(deck.exists());
    let deck_text =
        std::fs::read_to_string(article_dir.join("2405_01234v1.md")).unwrap();
    assert!(deck_text.contains("# グラフに基づく量子アルゴリズム"));
    assert!(deck_text.contains("__課題__  探索の高速化"));
    assert!(deck_text.contains("__手法__  量子ウォーク"));
    assert!(deck_text.contains("__結果__  二乗の高速化を達成"));
    assert!(deck_text.contains("キーワード") || deck_text.contains("量子計算"));
    assert!(deck_text.contains("- 量子ウォーク"));
}

#[tokio::test]
async fn degraded_summarizer_still_notifies_without_deck() {
    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _title: &str, _abstract_text: &str) -> Result<String> {
            Err(paper_triage::TriageError::Summarization(
                "service unavailable".to_string(),
            ))
        }
    }

    let config = Config::from_yaml(CONFIG).unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let candidates = vec![candidate(
        "2405_01234v1",
        "A Graph-based Quantum Algorithm",
        "We study quantum walks on graphs.",
    )];

    let session = FeedSession::new().unwrap();
    let mut translator = EchoTranslator;
    let notifier = RecordingNotifier::default();

    let report = pipeline::process_candidates(
        candidates,
        &config,
        &session,
        &mut translator,
        Some(&FailingSummarizer),
        &notifier,
        &FileRenderer,
        out_dir.path(),
        &AssetLimits::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(report.decks, 0);

    let articles = notifier.articles.lock().unwrap();
    assert_eq!(articles.len(), 1);
    let (message, deck) = &articles[0];
    assert!(deck.is_none());
    assert!(message.contains(" Score: `3.5`"));
    assert!(message.contains(" Abstract:"));
    assert!(message.contains(" Original:"));
}

#[tokio::test]
async fn no_summarizer_skips_all_decks() {
    let config = Config::from_yaml(CONFIG).unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let candidates = vec![candidate(
        "2405_01234v1",
        "A Graph-based Quantum Algorithm",
        "We study quantum walks on graphs.",
    )];

    let session = FeedSession::new().unwrap();
    let mut translator = EchoTranslator;
    let notifier = RecordingNotifier::default();

    let report = pipeline::process_candidates(
        candidates,
        &config,
        &session,
        &mut translator,
        None,
        &notifier,
        &FileRenderer,
        out_dir.path(),
        &AssetLimits::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.decks, 0);
    assert_eq!(notifier.articles.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn notification_order_is_descending_by_score() {
    let config = Config::from_yaml(CONFIG).unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let candidates = vec![
        candidate("a1", "Graph paper", "All about graph structures."),
        candidate("a2", "Both topics", "quantum effects on a graph"),
        candidate("a3", "Quantum paper", "A quantum experiment."),
    ];

    let session = FeedSession::new().unwrap();
    let mut translator = EchoTranslator;
    let notifier = RecordingNotifier::default();

    let report = pipeline::process_candidates(
        candidates,
        &config,
        &session,
        &mut translator,
        None,
        &notifier,
        &FileRenderer,
        out_dir.path(),
        &AssetLimits::default(),
    )
    .await
    .unwrap();

    // "graph" alone (1.5) is below threshold; the other two are accepted.
    assert_eq!(report.accepted, 2);
    let articles = notifier.articles.lock().unwrap();
    assert!(articles[0].0.contains("`3.5`"));
    assert!(articles[1].0.contains("`2`"));
}

#[test]
fn image_extraction_dedups_shared_figures_and_honors_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("figures.pdf");
    write_pdf_with_figures(&pdf);

    // The figure referenced from both pages is emitted exactly once.
    let images =
        paper_triage::assets::extract_images(&pdf, dir.path(), &AssetLimits::default()).unwrap();
    assert_eq!(images.len(), 2);
    assert_ne!(images[0].name, images[1].name);
    assert!(images.iter().all(|img| img.ext == "png"));
    assert!(images.iter().all(|img| dir.path().join(&img.name).exists()));

    let limits = AssetLimits {
        max_num: 1,
        ..AssetLimits::default()
    };
    let images = paper_triage::assets::extract_images(&pdf, dir.path(), &limits).unwrap();
    assert_eq!(images.len(), 1);
}

#[tokio::test]
async fn asset_extraction_on_minimal_pdf_yields_no_assets() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("sample.pdf");
    write_sample_pdf(&pdf);

    let images =
        paper_triage::assets::extract_images(&pdf, dir.path(), &AssetLimits::default()).unwrap();
    assert!(images.is_empty());

    let tables = paper_triage::assets::extract_tables(&pdf, 20).unwrap();
    assert!(tables.is_empty());
}
