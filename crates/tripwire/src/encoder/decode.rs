//! Reads both layers back out of a trap document.

use lopdf::content::Content;
use lopdf::{Document, Object};

use super::winansi;
use super::EncodeError;

/// What a reader sees versus what extraction yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedLayers {
    /// Glyphs as rendered, one `\n` per explicit line break.
    pub visible: String,
    /// Glyphs outside `/ActualText` spans plus each span's replacement.
    pub extractable: String,
    pub actual_text_spans: Vec<String>,
}

impl DecodedLayers {
    pub fn has_actual_text(&self) -> bool {
        !self.actual_text_spans.is_empty()
    }
}

pub fn decode_layers(bytes: &[u8]) -> Result<DecodedLayers, EncodeError> {
    let doc = Document::load_mem(bytes)?;
    let mut layers = DecodedLayers::default();

    for (_, page_id) in doc.get_pages() {
        let data = doc.get_page_content(page_id)?;
        let content = Content::decode(&data)?;

        // One entry per open marked-content sequence: does it carry ActualText?
        let mut marks: Vec<bool> = Vec::new();
        let mut replaced = 0usize;

        for op in &content.operations {
            match op.operator.as_str() {
                "BDC" => {
                    let actual = op.operands.get(1).and_then(actual_text);
                    match actual {
                        Some(text) => {
                            if replaced == 0 {
                                layers.extractable.push_str(&text);
                                layers.actual_text_spans.push(text);
                            }
                            replaced += 1;
                            marks.push(true);
                        }
                        None => marks.push(false),
                    }
                }
                "BMC" => marks.push(false),
                "EMC" => {
                    if marks.pop() == Some(true) {
                        replaced = replaced.saturating_sub(1);
                    }
                }
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.last() {
                        push_glyphs(&mut layers, bytes, replaced > 0);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            if let Object::String(bytes, _) = item {
                                push_glyphs(&mut layers, bytes, replaced > 0);
                            }
                        }
                    }
                }
                "T*" => {
                    layers.visible.push('\n');
                    if replaced == 0 {
                        layers.extractable.push('\n');
                    }
                }
                _ => {}
            }
        }
    }

    Ok(layers)
}

fn push_glyphs(layers: &mut DecodedLayers, bytes: &[u8], replaced: bool) {
    let text = winansi::decode_bytes(bytes);
    if !replaced {
        layers.extractable.push_str(&text);
    }
    layers.visible.push_str(&text);
}

fn actual_text(properties: &Object) -> Option<String> {
    let dict = properties.as_dict().ok()?;
    let raw = dict.get(b"ActualText").ok()?.as_str().ok()?;
    Some(decode_text_string(raw))
}

/// PDF text strings are UTF-16BE with a BOM, or single-byte otherwise.
fn decode_text_string(raw: &[u8]) -> String {
    match raw {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => raw.iter().map(|b| *b as char).collect(),
    }
}
