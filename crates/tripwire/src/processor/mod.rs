//! Text extraction for submitted documents.

pub mod pdf;
pub mod text;

use crate::error::ProcessError;

pub use pdf::PdfExtractor;
pub use text::PlainTextExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Text,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "txt" | "md" | "text" => Some(DocumentFormat::Text),
            _ => None,
        }
    }

    /// Sniffs the leading bytes; anything that is not a PDF and decodes as
    /// UTF-8 is treated as text.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            Some(DocumentFormat::Pdf)
        } else if std::str::from_utf8(bytes).is_ok() {
            Some(DocumentFormat::Text)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Text => "txt",
        }
    }
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ProcessError>;
    fn supports(&self, format: DocumentFormat) -> bool;
}

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: vec![Box::new(PlainTextExtractor::new()), Box::new(PdfExtractor::new())],
        }
    }

    /// Registers an extractor ahead of the built-in ones.
    pub fn with_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self {
        self.extractors.insert(0, extractor);
        self
    }

    pub fn extract(&self, bytes: &[u8], format: DocumentFormat) -> Result<String, ProcessError> {
        for extractor in &self.extractors {
            if extractor.supports(format) {
                return extractor.extract(bytes);
            }
        }

        Err(ProcessError::UnsupportedFormat(format.extension().to_string()))
    }

    /// Detects the format from the extension, falling back to sniffing.
    pub fn extract_named(&self, bytes: &[u8], filename: &str) -> Result<String, ProcessError> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let format = DocumentFormat::from_extension(extension)
            .or_else(|| DocumentFormat::detect(bytes))
            .ok_or_else(|| ProcessError::UnsupportedFormat(extension.to_string()))?;

        self.extract(bytes, format)
    }
}
