use crate::error::PagemarkError;
use crate::extraction::WordExtractor;
use crate::geometry::{BBox, Bounds};
use crate::model::Token;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use std::process::Command;

const TOOL: &str = "pdftotext";

/// Word extraction backend using pdftotext (from poppler-utils).
///
/// Uses `pdftotext -bbox` on a single page and keeps the words whose boxes
/// overlap the requested region.
pub struct PdftotextWordExtractor;

impl PdftotextWordExtractor {
    pub fn new() -> Self {
        PdftotextWordExtractor
    }

    /// Check if pdftotext is available on the system.
    pub fn is_available() -> bool {
        Command::new(TOOL)
            .arg("-v")
            .output()
            .map(|o| o.status.success() || !o.stderr.is_empty())
            .unwrap_or(false)
    }

    /// Fail with `PopplerNotFound` unless pdftotext can be run.
    pub fn require() -> Result<(), PagemarkError> {
        super::require_tool(TOOL, Self::is_available())
    }
}

impl Default for PdftotextWordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl WordExtractor for PdftotextWordExtractor {
    fn extract_words(
        &self,
        pdf_path: &Path,
        page_index: usize,
        bounds: &Bounds,
    ) -> Result<Vec<Token>, PagemarkError> {
        // pdftotext pages are 1-based.
        let page_number = (page_index + 1).to_string();

        let output = Command::new(TOOL)
            .arg("-bbox")
            .args(["-f", &page_number, "-l", &page_number])
            .arg(pdf_path)
            .arg("-") // output to stdout
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PagemarkError::PopplerNotFound { tool: TOOL }
                } else {
                    PagemarkError::Extraction(format!("pdftotext -bbox failed: {}", e))
                }
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(PagemarkError::PopplerFailed {
                tool: TOOL,
                code,
                stderr,
            });
        }

        let xml = String::from_utf8_lossy(&output.stdout);
        let region = BBox::from_bounds(bounds);

        Ok(parse_bbox_words(&xml)?
            .into_iter()
            .filter(|w| w.bbox.overlaps(&region))
            .collect())
    }

    fn backend_name(&self) -> &str {
        TOOL
    }
}

/// Parse the `<word xMin=.. yMin=.. xMax=.. yMax=..>text</word>` elements of
/// `pdftotext -bbox` output, in document order.
fn parse_bbox_words(xml: &str) -> Result<Vec<Token>, PagemarkError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut words = Vec::new();
    let mut current: Option<BBox> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"word" => {
                current = parse_word_bbox(e);
                text.clear();
            }
            Ok(Event::Text(e)) => {
                if current.is_some() {
                    let unescaped = e
                        .unescape()
                        .map_err(|err| PagemarkError::Extraction(err.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"word" => {
                if let Some(bbox) = current.take() {
                    let word = text.trim();
                    if !word.is_empty() {
                        words.push(Token {
                            text: word.to_string(),
                            bbox,
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(PagemarkError::Extraction(format!(
                    "malformed pdftotext -bbox output at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(words)
}

fn parse_word_bbox(tag: &BytesStart<'_>) -> Option<BBox> {
    let mut x_min = None;
    let mut y_min = None;
    let mut x_max = None;
    let mut y_max = None;

    for attr in tag.attributes().flatten() {
        let value: Option<f64> = std::str::from_utf8(&attr.value)
            .ok()
            .and_then(|v| v.parse().ok());
        match attr.key.as_ref() {
            b"xMin" => x_min = value,
            b"yMin" => y_min = value,
            b"xMax" => x_max = value,
            b"yMax" => y_max = value,
            _ => {}
        }
    }

    let (x_min, y_min, x_max, y_max) = (x_min?, y_min?, x_max?, y_max?);
    Some(BBox::new(x_min, y_min, x_max - x_min, y_max - y_min))
}
