use crate::types::{ExtractedImage, ExtractedTable, Result, TriageError};
use image::codecs::pnm::{PnmEncoder, PnmSubtype};
use image::{DynamicImage, GrayImage, ImageEncoder, ImageFormat, RgbImage, RgbaImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use regex::Regex;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// Filter thresholds for extracted images, matching the slide layout's needs.
#[derive(Debug, Clone)]
pub struct AssetLimits {
    pub min_width: i64,
    pub min_height: i64,
    /// Emitted byte size must exceed this.
    pub abs_size: usize,
    /// Neither width:height nor height:width may exceed this.
    pub max_ratio: f64,
    /// Cap on images and on tables, independently.
    pub max_num: usize,
}

impl Default for AssetLimits {
    fn default() -> Self {
        Self {
            min_width: 400,
            min_height: 400,
            abs_size: 2048,
            max_ratio: 8.0,
            max_num: 20,
        }
    }
}

fn pdf_err(context: &str, e: lopdf::Error) -> TriageError {
    TriageError::Asset(format!("{context}: {e}"))
}

/// Extract embedded images from a PDF into `out_dir`, page order, deduped by
/// cross-reference id, filtered and capped per `limits`.
pub fn extract_images(
    pdf_path: &Path,
    out_dir: &Path,
    limits: &AssetLimits,
) -> Result<Vec<ExtractedImage>> {
    std::fs::create_dir_all(out_dir)?;
    let doc = Document::load(pdf_path).map_err(|e| pdf_err("open failed", e))?;

    let mut emitted: HashSet<ObjectId> = HashSet::new();
    let mut images = Vec::new();

    'pages: for (page_no, page_id) in doc.get_pages() {
        if images.len() >= limits.max_num {
            break;
        }
        let refs = match page_image_refs(&doc, page_id) {
            Ok(refs) => refs,
            Err(e) => {
                debug!("Page {}: no usable resources ({})", page_no, e);
                continue;
            }
        };

        for xref in refs {
            if emitted.contains(&xref) {
                continue;
            }
            let stream = match doc.get_object(xref).and_then(Object::as_stream) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let (width, height) = match image_dimensions(&stream.dict) {
                Some(dims) => dims,
                None => continue,
            };
            if width < limits.min_width && height < limits.min_height {
                continue;
            }

            let recovered = match recover_image(&doc, xref) {
                Some(r) => r,
                None => {
                    debug!("Page {}: image {:?} not decodable, skipped", page_no, xref);
                    continue;
                }
            };
            if recovered.bytes.len() <= limits.abs_size {
                continue;
            }
            let (w, h) = (width as f64, height as f64);
            if w / h > limits.max_ratio || h / w > limits.max_ratio {
                continue;
            }

            let name = format!("img{:02}_{:05}.{}", page_no, xref.0, recovered.ext);
            std::fs::write(out_dir.join(&name), &recovered.bytes)?;
            emitted.insert(xref);
            images.push(ExtractedImage {
                name,
                page: page_no,
                width: width as u32,
                height: height as u32,
                bytes: recovered.bytes,
                ext: recovered.ext.to_string(),
            });
            if images.len() >= limits.max_num {
                break 'pages;
            }
        }
    }

    info!("Extracted {} images from {}", images.len(), pdf_path.display());
    Ok(images)
}

/// Image XObject references on one page, resolving inherited resources.
fn page_image_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>> {
    let resources = page_resources(doc, page_id)?;
    let xobjects = match resources.get(b"XObject") {
        Ok(obj) => resolve_dict(doc, obj)
            .ok_or_else(|| TriageError::Asset("XObject is not a dictionary".into()))?,
        Err(_) => return Ok(Vec::new()),
    };

    let mut refs = Vec::new();
    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n == b"Image")
            .unwrap_or(false);
        if is_image {
            refs.push(id);
        }
    }
    Ok(refs)
}

/// Walk the page dictionary and its Parent chain for a Resources entry.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<&Dictionary> {
    let mut current = page_id;
    loop {
        let dict = doc
            .get_dictionary(current)
            .map_err(|e| pdf_err("page dictionary missing", e))?;
        if let Ok(obj) = dict.get(b"Resources") {
            return resolve_dict(doc, obj)
                .ok_or_else(|| TriageError::Asset("Resources is not a dictionary".into()));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => return Err(TriageError::Asset("no Resources in page tree".into())),
        }
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        _ => None,
    }
}

fn image_dimensions(dict: &Dictionary) -> Option<(i64, i64)> {
    let width = dict.get(b"Width").ok()?.as_i64().ok()?;
    let height = dict.get(b"Height").ok()?.as_i64().ok()?;
    Some((width, height))
}

struct RecoveredImage {
    bytes: Vec<u8>,
    ext: &'static str,
}

/// Recover final pixel content for an image XObject.
///
/// Soft-masked images are composed base+mask, stripping any pre-existing
/// alpha first and falling back to the unmasked base when composition fails.
/// Non-default color spaces are converted to RGB. Encoding follows the base
/// image's channel count, decided before composition: more than 3 channels
/// goes to the PAM pixel archive, otherwise PNG. A masked RGB base therefore
/// comes out as an RGBA PNG, which the deck renderer can display.
fn recover_image(doc: &Document, xref: ObjectId) -> Option<RecoveredImage> {
    let stream = doc.get_object(xref).and_then(Object::as_stream).ok()?;
    let base = decode_image_stream(doc, xref)?;
    let pam = base.color().channel_count() > 3;

    let smask = stream
        .dict
        .get(b"SMask")
        .and_then(Object::as_reference)
        .ok();
    let composed = match smask {
        Some(mask_ref) => {
            // Strip alpha before composing; fall back to the base on failure.
            let base_rgb = base.to_rgb8();
            match decode_image_stream(doc, mask_ref).and_then(|m| compose(&base_rgb, &m)) {
                Some(rgba) => DynamicImage::ImageRgba8(rgba),
                None => DynamicImage::ImageRgb8(base_rgb),
            }
        }
        None => {
            if has_custom_colorspace(&stream.dict) {
                DynamicImage::ImageRgb8(base.to_rgb8())
            } else {
                base
            }
        }
    };

    encode_image(&composed, pam)
}

/// Apply a grayscale soft mask as the alpha channel. Dimension mismatch is a
/// composition failure.
fn compose(base: &RgbImage, mask: &DynamicImage) -> Option<RgbaImage> {
    let mask: GrayImage = mask.to_luma8();
    if mask.dimensions() != base.dimensions() {
        return None;
    }
    let (w, h) = base.dimensions();
    let mut out = RgbaImage::new(w, h);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let rgb = base.get_pixel(x, y);
        let alpha = mask.get_pixel(x, y)[0];
        *pixel = image::Rgba([rgb[0], rgb[1], rgb[2], alpha]);
    }
    Some(out)
}

fn has_custom_colorspace(dict: &Dictionary) -> bool {
    match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => {
            name.as_slice() != b"DeviceRGB" && name.as_slice() != b"DeviceGray"
        }
        Ok(_) => true,
        Err(_) => false,
    }
}

/// Decode one image stream to pixels. DCT-compressed payloads decode as
/// JPEG; flate payloads rebuild from raw samples using the declared color
/// space. Anything else is not decodable here.
fn decode_image_stream(doc: &Document, id: ObjectId) -> Option<DynamicImage> {
    let stream = doc.get_object(id).and_then(Object::as_stream).ok()?;
    let filter = primary_filter(&stream.dict);

    match filter.as_deref() {
        Some(b"DCTDecode") => image::load_from_memory(&stream.content).ok(),
        Some(b"FlateDecode") | None => {
            let data = match filter {
                Some(_) => stream.decompressed_content().ok()?,
                None => stream.content.clone(),
            };
            let (width, height) = image_dimensions(&stream.dict)?;
            from_raw_samples(&stream.dict, data, width as u32, height as u32)
        }
        _ => None,
    }
}

fn primary_filter(dict: &Dictionary) -> Option<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => Some(name.clone()),
        Ok(Object::Array(filters)) => filters
            .first()
            .and_then(|f| f.as_name().ok())
            .map(|n| n.to_vec()),
        _ => None,
    }
}

fn from_raw_samples(
    dict: &Dictionary,
    data: Vec<u8>,
    width: u32,
    height: u32,
) -> Option<DynamicImage> {
    let bits = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }
    let pixels = (width as usize) * (height as usize);
    match data.len() / pixels.max(1) {
        1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        4 => {
            // CMYK samples; naive fold into RGB.
            let mut rgb = Vec::with_capacity(pixels * 3);
            for chunk in data.chunks_exact(4) {
                let (c, m, y, k) = (
                    chunk[0] as u16,
                    chunk[1] as u16,
                    chunk[2] as u16,
                    chunk[3] as u16,
                );
                rgb.push(((255 - c) * (255 - k) / 255) as u8);
                rgb.push(((255 - m) * (255 - k) / 255) as u8);
                rgb.push(((255 - y) * (255 - k) / 255) as u8);
            }
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}

fn encode_image(img: &DynamicImage, pam: bool) -> Option<RecoveredImage> {
    let mut bytes = Vec::new();
    if pam {
        let encoder = PnmEncoder::new(&mut bytes).with_subtype(PnmSubtype::ArbitraryMap);
        encoder
            .write_image(
                img.as_bytes(),
                img.width(),
                img.height(),
                img.color().into(),
            )
            .ok()?;
        Some(RecoveredImage { bytes, ext: "pam" })
    } else {
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .ok()?;
        Some(RecoveredImage { bytes, ext: "png" })
    }
}

/// Extract tabular regions from the PDF's text, capped at `max_num` tables.
/// Any failure here is reported to the caller, who treats it as non-fatal to
/// slide generation.
pub fn extract_tables(pdf_path: &Path, max_num: usize) -> Result<Vec<ExtractedTable>> {
    let doc = Document::load(pdf_path).map_err(|e| pdf_err("open failed", e))?;
    let mut tables = Vec::new();

    for (page_no, _) in doc.get_pages() {
        if tables.len() >= max_num {
            break;
        }
        let text = match doc.extract_text(&[page_no]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Page {}: text extraction failed: {}", page_no, e);
                continue;
            }
        };
        for grid in detect_tables(&text) {
            tables.push(ExtractedTable {
                page: page_no,
                markdown: render_markdown_table(&grid),
            });
            if tables.len() >= max_num {
                break;
            }
        }
    }

    info!("Extracted {} tables from {}", tables.len(), pdf_path.display());
    Ok(tables)
}

/// Detect runs of consecutive lines that split into two or more columns on
/// tab or multi-space separators. Each run of at least two lines is one
/// table; the first row is its header.
pub fn detect_tables(text: &str) -> Vec<Vec<Vec<String>>> {
    let separator = Regex::new(r"\t| {2,}").expect("valid regex");
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in text.lines().chain(std::iter::once("")) {
        let cells: Vec<String> = separator
            .split(line.trim())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if cells.len() >= 2 {
            current.push(cells);
        } else {
            if current.len() >= 2 {
                tables.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    tables
}

/// Row-major grid to a Markdown fragment; first row is the header and data
/// rows are padded to the header width.
pub fn render_markdown_table(grid: &[Vec<String>]) -> String {
    let Some(header) = grid.first() else {
        return String::new();
    };
    let width = header.len();
    let mut out = String::new();

    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!("|{}\n", " --- |".repeat(width)));
    for row in &grid[1..] {
        let mut cells = row.clone();
        cells.resize(width, String::new());
        cells.truncate(width);
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_column_aligned_runs_as_tables() {
        let text = "Some prose line.\n\
                    Method  Accuracy  Runtime\n\
                    Ours    0.95      12s\n\
                    Base    0.88      9s\n\
                    More prose.\n";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 3);
        assert_eq!(tables[0][0], vec!["Method", "Accuracy", "Runtime"]);
    }

    #[test]
    fn single_column_lines_are_not_tables() {
        let tables = detect_tables("just a line\nanother line\n");
        assert!(tables.is_empty());
    }

    #[test]
    fn lone_aligned_line_is_not_a_table() {
        let tables = detect_tables("a  b  c\nprose follows here\n");
        assert!(tables.is_empty());
    }

    #[test]
    fn renders_header_and_padded_rows() {
        let grid = vec![
            vec!["A".to_string(), "B".to_string()],
            vec!["1".to_string()],
            vec!["2".to_string(), "3".to_string(), "4".to_string()],
        ];
        let md = render_markdown_table(&grid);
        assert_eq!(md, "| A | B |\n| --- | --- |\n| 1 |  |\n| 2 | 3 |\n");
    }

    #[test]
    fn compose_requires_matching_dimensions() {
        let base = RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
        let mask = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, image::Luma([128])));
        let out = compose(&base, &mask).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30, 128]);

        let bad_mask = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, image::Luma([0])));
        assert!(compose(&base, &bad_mask).is_none());
    }

    #[test]
    fn encoding_follows_the_base_channel_count() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 4])));
        assert_eq!(encode_image(&rgba, true).unwrap().ext, "pam");

        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3])));
        assert_eq!(encode_image(&rgb, false).unwrap().ext, "png");
    }

    #[test]
    fn masked_rgb_base_still_encodes_as_png() {
        // Composing an RGB base with its soft mask yields RGBA, but the
        // pam/png choice was made on the 3-channel base.
        let composed =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 128])));
        let recovered = encode_image(&composed, false).unwrap();
        assert_eq!(recovered.ext, "png");
        let decoded = image::load_from_memory(&recovered.bytes).unwrap();
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0).0, [10, 20, 30, 128]);
    }

    #[test]
    fn cmyk_samples_fold_to_rgb_without_crushing_chroma() {
        let dict = Dictionary::new();
        // Pure cyan: green and blue must survive the fold.
        let img = from_raw_samples(&dict, vec![255, 0, 0, 0], 1, 1).unwrap();
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [0, 255, 255]);
        // Full key is black regardless of the other channels.
        let img = from_raw_samples(&dict, vec![0, 0, 0, 255], 1, 1).unwrap();
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [0, 0, 0]);
        // Half key darkens proportionally.
        let img = from_raw_samples(&dict, vec![0, 0, 0, 127], 1, 1).unwrap();
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [128, 128, 128]);
    }
}
