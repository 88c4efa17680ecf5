//! Trap encoder: a PDF whose rendered glyphs show the original instructions
//! while text extraction yields the altered wording.
//!
//! The visible layer is a plain Courier glyph stream. Each trap span is
//! wrapped in marked content carrying `/ActualText`, which extraction and
//! copy/paste substitute for the glyphs underneath.

mod decode;
mod layout;
pub mod winansi;

use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, Stream};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::Modification;

pub use decode::{decode_layers, DecodedLayers};
use layout::Segment;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("Original text is empty")]
    EmptyOriginal,

    #[error("Modification {index} has offsets [{start}, {end}) outside a text of {len} characters")]
    OffsetOutOfRange {
        index: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Modification {index} starts at {start}, before the previous one ends at {previous_end}")]
    Overlap {
        index: usize,
        start: usize,
        previous_end: usize,
    },

    #[error("Modification {index} expects '{expected}' but the original has '{found}'")]
    SubstringMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Character {ch:?} at offset {position} cannot be rendered in the document font")]
    UnsupportedCharacter { ch: char, position: usize },

    #[error("Modification {index} covers no original text")]
    EmptySpan { index: usize },

    #[error("Modification {index} does not fit on a single page")]
    TrapTooLong { index: usize },

    #[error("Invalid encoder options: {0}")]
    InvalidOptions(String),

    #[error("PDF error: {0}")]
    Pdf(String),
}

impl EncodeError {
    /// Errors caused by the caller's text or modification set.
    pub fn is_validation(&self) -> bool {
        !matches!(self, EncodeError::Pdf(_))
    }
}

impl From<lopdf::Error> for EncodeError {
    fn from(e: lopdf::Error) -> Self {
        EncodeError::Pdf(e.to_string())
    }
}

/// Page geometry, in PDF points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    pub font_size: f32,
    pub margin: f32,
    pub page_width: f32,
    pub page_height: f32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        // US Letter
        Self {
            font_size: 12.0,
            margin: 50.0,
            page_width: 612.0,
            page_height: 792.0,
        }
    }
}

impl EncoderOptions {
    pub fn validate(&self) -> Result<(), EncodeError> {
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(EncodeError::InvalidOptions(
                "font_size must be positive".to_string(),
            ));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(EncodeError::InvalidOptions(
                "margin must not be negative".to_string(),
            ));
        }
        if self.page_width - 2.0 * self.margin < self.font_size
            || self.page_height - 2.0 * self.margin < self.font_size
        {
            return Err(EncodeError::InvalidOptions(
                "page is too small for the margin and font size".to_string(),
            ));
        }
        Ok(())
    }
}

/// An encoded trap document.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapDocument {
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`.
    pub content_hash: String,
    pub page_count: u32,
    /// 1-based page each modification starts on, in modification order.
    pub trap_pages: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct TrapEncoder {
    options: EncoderOptions,
}

impl TrapEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Rejects text this encoder could never render, before any trap set
    /// is built on it.
    pub fn check_original(&self, original: &str) -> Result<(), EncodeError> {
        self.options.validate()?;
        check_renderable(original)
    }

    /// Encodes `original` with every modification's span replaced in the
    /// extractable layer. Output is deterministic for identical inputs.
    pub fn encode(
        &self,
        original: &str,
        modifications: &[Modification],
    ) -> Result<TrapDocument, EncodeError> {
        self.options.validate()?;
        let segments = segment(original, modifications)?;
        let laid_out = layout::layout(&self.options, &segments)?;
        let page_count = laid_out.pages.len() as u32;
        let bytes = self.assemble(laid_out.pages)?;

        Ok(TrapDocument {
            content_hash: content_hash(&bytes),
            bytes,
            page_count,
            trap_pages: laid_out.trap_pages,
        })
    }

    fn assemble(&self, pages: Vec<Vec<lopdf::content::Operation>>) -> Result<Vec<u8>, EncodeError> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids = Vec::with_capacity(pages.len());
        for operations in pages {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    self.options.page_width.into(),
                    self.options.page_height.into(),
                ],
                "Resources" => resources_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "MarkInfo" => dictionary! {
                "Marked" => true,
            },
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| EncodeError::Pdf(e.to_string()))?;
        Ok(bytes)
    }
}

/// Encodes with default page geometry.
pub fn encode(original: &str, modifications: &[Modification]) -> Result<TrapDocument, EncodeError> {
    TrapEncoder::default().encode(original, modifications)
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// True when `bytes` hash to `expected` (hex, any case).
pub fn verify_hash(bytes: &[u8], expected: &str) -> bool {
    content_hash(bytes).eq_ignore_ascii_case(expected.trim())
}

/// Fails on empty text or on the first glyph the document font lacks.
pub fn check_renderable(original: &str) -> Result<(), EncodeError> {
    if original.is_empty() {
        return Err(EncodeError::EmptyOriginal);
    }
    if let Some((position, ch)) = original
        .chars()
        .enumerate()
        .find(|(_, c)| !winansi::is_encodable(*c))
    {
        return Err(EncodeError::UnsupportedCharacter { ch, position });
    }
    Ok(())
}

/// Checks the modification set against `original` and splits the text
/// into plain and trap segments.
fn segment<'a>(
    original: &'a str,
    modifications: &'a [Modification],
) -> Result<Vec<Segment<'a>>, EncodeError> {
    check_renderable(original)?;

    // Char offset -> byte offset, with one trailing entry for the end.
    let mut boundaries: Vec<usize> = original.char_indices().map(|(b, _)| b).collect();
    boundaries.push(original.len());
    let len = boundaries.len() - 1;

    let mut segments = Vec::with_capacity(modifications.len() * 2 + 1);
    let mut previous_end = 0;

    for (index, m) in modifications.iter().enumerate() {
        if m.start_index > m.end_index || m.end_index > len {
            return Err(EncodeError::OffsetOutOfRange {
                index,
                start: m.start_index,
                end: m.end_index,
                len,
            });
        }
        // Marked content with no glyphs inside is dropped by extractors.
        if m.start_index == m.end_index {
            return Err(EncodeError::EmptySpan { index });
        }
        if m.start_index < previous_end {
            return Err(EncodeError::Overlap {
                index,
                start: m.start_index,
                previous_end,
            });
        }

        let found = &original[boundaries[m.start_index]..boundaries[m.end_index]];
        if found != m.original_text {
            return Err(EncodeError::SubstringMismatch {
                index,
                expected: m.original_text.clone(),
                found: found.to_string(),
            });
        }

        let plain = &original[boundaries[previous_end]..boundaries[m.start_index]];
        if !plain.is_empty() {
            segments.push(Segment::Plain(plain));
        }
        segments.push(Segment::Trap {
            index,
            visible: found,
            actual: &m.modified_text,
        });
        previous_end = m.end_index;
    }

    let tail = &original[boundaries[previous_end]..];
    if !tail.is_empty() {
        segments.push(Segment::Plain(tail));
    }

    Ok(segments)
}

/// Applies modifications to `original`: the text extraction should yield.
pub fn apply_modifications(original: &str, modifications: &[Modification]) -> String {
    let chars: Vec<char> = original.chars().collect();
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;
    for m in modifications {
        let start = m.start_index.min(chars.len()).max(cursor);
        out.extend(&chars[cursor..start]);
        out.push_str(&m.modified_text);
        cursor = m.end_index.min(chars.len()).max(start);
    }
    out.extend(&chars[cursor..]);
    out
}
