use crate::encoder;
use crate::error::ProcessError;
use crate::processor::{DocumentFormat, TextExtractor};

/// Extracts the text a copy/paste or upload pipeline would see: marked
/// content carrying `/ActualText` yields its replacement, not its glyphs.
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.pdf", bytes = bytes.len()).entered();

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

        // Documents with ActualText spans go through the layer decoder, which
        // honours the replacement the way viewers do.
        let layers = match encoder::decode_layers(bytes) {
            Ok(layers) if layers.has_actual_text() => return Ok(layers.extractable),
            Ok(layers) => Some(layers),
            Err(e) => {
                tracing::debug!("Layer decode failed, using plain extraction: {}", e);
                None
            }
        };

        let text = extract_text_from_pdf(&doc)?;
        if is_unusable(&text) {
            if let Some(layers) = layers.filter(|l| !is_unusable(&l.extractable)) {
                return Ok(layers.extractable);
            }
            return Err(ProcessError::TextExtraction(
                "PDF has no usable text layer (scanned or image-only?)".to_string(),
            ));
        }
        Ok(text)
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Pdf)
    }
}

fn extract_text_from_pdf(doc: &lopdf::Document) -> Result<String, ProcessError> {
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut text = String::new();

    for page_num in pages {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                tracing::warn!("Failed to extract text from page {}: {}", page_num, e);
            }
        }
    }

    Ok(text)
}

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Below this length the alphanumeric ratio check is skipped.
const MIN_TOTAL_CHARS: usize = 50;

const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Empty, only font-encoding error markers, or mostly garbage.
fn is_unusable(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}
