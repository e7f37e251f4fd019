use crate::types::{ExtractedImage, ExtractedTable, Result, SummaryDocument, TriageError};
use std::path::{Path, PathBuf};
use tracing::info;

// 16:9 canvas the renderer draws on.
const CANVAS_WIDTH: f64 = 1600.0;
const CANVAS_HEIGHT: f64 = 900.0;
// Fraction of the canvas one grid cell may occupy.
const CELL_WIDTH_FRACTION: f64 = 0.45;
const CELL_HEIGHT_FRACTION: f64 = 0.40;
const GRID_CELLS: usize = 4;

/// Insert `brk` after every Japanese sentence terminator and after every
/// English `". "` boundary. Trailing breaks are trimmed.
pub fn sentence_wrap(text: &str, brk: &str) -> String {
    let mut wrapped = text.replace(". ", &format!(".{brk}"));
    wrapped = wrapped.replace('。', &format!("。{brk}"));
    while wrapped.ends_with(brk) {
        wrapped.truncate(wrapped.len() - brk.len());
    }
    wrapped
}

/// Pad a list with empty placeholder cells until its length is a multiple of
/// four, ready for 2×2 grid layout.
pub fn pad_to_grid<T>(items: Vec<T>) -> Vec<Option<T>> {
    let mut cells: Vec<Option<T>> = items.into_iter().map(Some).collect();
    while cells.len() % GRID_CELLS != 0 {
        cells.push(None);
    }
    cells
}

/// Display width for an image in a grid cell: fit a fixed fraction of the
/// canvas while preserving aspect ratio.
pub fn display_width(width: u32, height: u32) -> u32 {
    let x_ratio = CELL_WIDTH_FRACTION * CANVAS_WIDTH / width as f64;
    let y_ratio = CELL_HEIGHT_FRACTION * CANVAS_HEIGHT / height as f64;
    (x_ratio.min(y_ratio) * width as f64) as u32
}

/// Produce the deck text for one summarized article. Byte-identical output
/// for identical inputs; no randomness, no I/O.
pub fn compose_deck(
    doc: &SummaryDocument,
    images: &[ExtractedImage],
    tables: &[ExtractedTable],
) -> String {
    let mut md = String::new();
    md.push_str("---\n");
    md.push_str("marp: true\n");
    md.push_str("theme: default\n");
    md.push_str("size: 16:9\n");
    md.push_str("paginate: true\n");
    md.push_str("_class: [\"cool-theme\"]\n");
    md.push('\n');

    // Title section.
    md.push_str("\n---\n");
    md.push_str("<!-- _class: title -->\n");
    md.push_str(&format!("# {}\n", doc.title_jp));
    md.push_str(&format!("{}\n", doc.title));
    md.push_str(&format!("[{}] {} {}\n\n", doc.year, doc.keywords, doc.entry_id));
    md.push_str(&format!("__課題__  {}\n\n", sentence_wrap(&doc.problem, "<br>")));
    md.push_str(&format!("__手法__  {}\n\n", sentence_wrap(&doc.method, "<br>")));
    md.push_str(&format!("__結果__  {}\n\n", sentence_wrap(&doc.result, "<br>")));

    // Terminology, only when the summary carried any.
    if !doc.terminology.is_empty() {
        md.push_str("---\n");
        md.push_str("<!-- _class: info -->\n");
        for line in &doc.terminology {
            md.push_str(&format!("- {line}\n"));
        }
        md.push('\n');
    }

    // Japanese abstract, then the original-language abstract.
    for abstract_text in [&doc.abstract_jp, &doc.abstract_text] {
        md.push_str("---\n");
        md.push_str("<!-- _class: info -->\n");
        md.push_str("<span style=\"font-size: 60%;\">\n");
        md.push_str(&sentence_wrap(abstract_text, "<br>"));
        md.push_str("\n</span>\n\n");
    }

    // Image grids, four per slide in a 2×2 arrangement.
    for slide in pad_to_grid(images.to_vec()).chunks(GRID_CELLS) {
        md.push_str("---\n");
        md.push_str("<!-- _class: grid -->\n");
        for row in slide.chunks(2) {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Some(img) => format!(
                        "![w:{}]({})",
                        display_width(img.width, img.height),
                        img.name
                    ),
                    None => "&nbsp;".to_string(),
                })
                .collect();
            md.push_str(&format!("{}\n", cells.join(" ")));
        }
        md.push('\n');
    }

    // Table grids, same arrangement.
    for slide in pad_to_grid(tables.to_vec()).chunks(GRID_CELLS) {
        md.push_str("---\n");
        md.push_str("<!-- _class: grid -->\n");
        for cell in slide {
            match cell {
                Some(table) => md.push_str(&format!("{}\n", table.markdown)),
                None => md.push_str("&nbsp;\n"),
            }
        }
        md.push('\n');
    }

    md
}

/// Shell out to marp. The composer's contract ends at the deck text; this is
/// a collaborator call.
pub async fn render_deck(md_path: &Path) -> Result<PathBuf> {
    let stem = md_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| TriageError::Render("deck path has no stem".into()))?;
    let output = md_path.with_file_name(format!("{stem}_slide.pdf"));

    let status = tokio::process::Command::new("marp")
        .arg("--pdf")
        .arg("--html")
        .arg("--allow-local-files")
        .arg(md_path)
        .arg("-o")
        .arg(&output)
        .status()
        .await
        .map_err(|e| TriageError::Render(format!("failed to launch marp: {e}")))?;
    if !status.success() {
        return Err(TriageError::Render(format!("marp exited with {status}")));
    }
    info!("Rendered deck {}", output.display());
    Ok(output)
}
