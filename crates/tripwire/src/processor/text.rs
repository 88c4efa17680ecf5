use crate::error::ProcessError;
use crate::processor::{DocumentFormat, TextExtractor};

pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ProcessError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProcessError::TextExtraction(format!("not valid UTF-8: {}", e)))?;
        // Drop a leading BOM some editors write.
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bom() {
        let extractor = PlainTextExtractor::new();
        let text = extractor.extract("\u{feff}hello".as_bytes()).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_invalid_utf8() {
        let extractor = PlainTextExtractor::new();
        assert!(matches!(
            extractor.extract(&[0xC3, 0x28]),
            Err(ProcessError::TextExtraction(_))
        ));
    }
}
