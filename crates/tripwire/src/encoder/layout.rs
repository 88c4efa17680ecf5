//! Monospaced page layout producing content-stream operations.
//!
//! Every glyph of the original text is shown with `Tj`; hard line breaks
//! are `T*` and soft wraps are a bare `Td`, so the glyph stream plus one
//! newline per `T*` reproduces the original exactly. Trap spans are wrapped
//! in a `/Span` marked-content sequence whose `/ActualText` carries the
//! altered wording; a span never crosses a page boundary.

use lopdf::content::Operation;
use lopdf::{dictionary, Object, StringFormat};

use super::winansi;
use super::{EncodeError, EncoderOptions};

/// Advance width of every Courier glyph, in text space units per point.
const COURIER_ADVANCE: f32 = 0.6;
const LEADING_FACTOR: f32 = 1.2;

/// A piece of the original text.
pub(crate) enum Segment<'a> {
    Plain(&'a str),
    Trap {
        index: usize,
        visible: &'a str,
        actual: &'a str,
    },
}

#[derive(Debug)]
pub(crate) struct LaidOut {
    pub pages: Vec<Vec<Operation>>,
    /// 1-based start page for each trap, by trap index.
    pub trap_pages: Vec<u32>,
}

pub(crate) struct PageWriter<'o> {
    options: &'o EncoderOptions,
    chars_per_line: usize,
    lines_per_page: usize,
    col: usize,
    line: usize,
    run: Vec<u8>,
    ops: Vec<Operation>,
    pages: Vec<Vec<Operation>>,
    trap_pages: Vec<u32>,
}

impl<'o> PageWriter<'o> {
    pub fn new(options: &'o EncoderOptions) -> Self {
        let usable_width = options.page_width - 2.0 * options.margin;
        let usable_height = options.page_height - 2.0 * options.margin;
        let chars_per_line = (usable_width / (COURIER_ADVANCE * options.font_size)).floor();
        let lines_per_page = (usable_height / (LEADING_FACTOR * options.font_size)).floor();

        let mut writer = Self {
            options,
            chars_per_line: (chars_per_line as usize).max(1),
            lines_per_page: (lines_per_page as usize).max(1),
            col: 0,
            line: 0,
            run: Vec::new(),
            ops: Vec::new(),
            pages: Vec::new(),
            trap_pages: Vec::new(),
        };
        writer.begin_page();
        writer
    }

    pub fn chars_per_line(&self) -> usize {
        self.chars_per_line
    }

    pub fn lines_per_page(&self) -> usize {
        self.lines_per_page
    }

    fn leading(&self) -> f32 {
        LEADING_FACTOR * self.options.font_size
    }

    fn begin_page(&mut self) {
        let top = self.options.page_height - self.options.margin - self.options.font_size;
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec!["F1".into(), self.options.font_size.into()],
        ));
        self.ops
            .push(Operation::new("TL", vec![self.leading().into()]));
        self.ops.push(Operation::new(
            "Td",
            vec![self.options.margin.into(), top.into()],
        ));
        self.col = 0;
        self.line = 0;
    }

    fn end_page(&mut self) {
        self.flush_run();
        self.ops.push(Operation::new("ET", vec![]));
        self.pages.push(std::mem::take(&mut self.ops));
    }

    fn page_break(&mut self) {
        self.end_page();
        self.begin_page();
    }

    fn flush_run(&mut self) {
        if self.run.is_empty() {
            return;
        }
        let bytes = std::mem::take(&mut self.run);
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(bytes, StringFormat::Literal)],
        ));
    }

    fn hard_break(&mut self) {
        self.flush_run();
        self.ops.push(Operation::new("T*", vec![]));
        self.line += 1;
        self.col = 0;
    }

    fn soft_break(&mut self) {
        self.flush_run();
        let leading = self.leading();
        self.ops
            .push(Operation::new("Td", vec![0.into(), (-leading).into()]));
        self.line += 1;
        self.col = 0;
    }

    /// Starts a new page when the cursor has run past the last line.
    fn ensure_room(&mut self) {
        if self.line >= self.lines_per_page {
            self.page_break();
        }
    }

    fn put_glyph(&mut self, c: char) {
        if let Some(byte) = winansi::encode_char(c) {
            self.run.push(byte);
        }
        self.col += 1;
    }

    pub fn write_plain(&mut self, text: &str) {
        let mut word = String::new();
        for c in text.chars() {
            if c.is_whitespace() {
                self.write_word(&word);
                word.clear();
                if c == '\n' {
                    self.hard_break();
                } else {
                    // Trailing spaces may hang past the margin.
                    self.ensure_room();
                    self.put_glyph(c);
                }
            } else {
                word.push(c);
            }
        }
        self.write_word(&word);
    }

    fn write_word(&mut self, word: &str) {
        if word.is_empty() {
            return;
        }
        let len = word.chars().count();
        if self.col > 0 && self.col + len > self.chars_per_line {
            self.soft_break();
        }
        for c in word.chars() {
            if self.col >= self.chars_per_line {
                self.soft_break();
            }
            self.ensure_room();
            self.put_glyph(c);
        }
    }

    /// Line breaks the trap would cause if started at column `col`.
    fn trap_breaks(&self, mut col: usize, visible: &str) -> usize {
        let mut breaks = 0;
        for c in visible.chars() {
            if c == '\n' {
                breaks += 1;
                col = 0;
                continue;
            }
            if col >= self.chars_per_line {
                breaks += 1;
                col = 0;
            }
            col += 1;
        }
        breaks
    }

    pub fn write_trap(
        &mut self,
        index: usize,
        visible: &str,
        actual: &str,
    ) -> Result<(), EncodeError> {
        let first_line = visible.split('\n').next().unwrap_or("").chars().count();
        if self.col > 0 && self.col + first_line > self.chars_per_line {
            self.soft_break();
        }
        self.ensure_room();

        if self.line + self.trap_breaks(self.col, visible) >= self.lines_per_page {
            if self.trap_breaks(0, visible) >= self.lines_per_page {
                return Err(EncodeError::TrapTooLong { index });
            }
            self.page_break();
        }

        self.flush_run();
        self.trap_pages.push(self.pages.len() as u32 + 1);
        self.ops.push(Operation::new(
            "BDC",
            vec![
                "Span".into(),
                Object::Dictionary(dictionary! {
                    "ActualText" => Object::String(utf16be_with_bom(actual), StringFormat::Hexadecimal),
                }),
            ],
        ));

        for c in visible.chars() {
            if c == '\n' {
                self.hard_break();
                continue;
            }
            if self.col >= self.chars_per_line {
                self.soft_break();
            }
            self.put_glyph(c);
        }

        self.flush_run();
        self.ops.push(Operation::new("EMC", vec![]));
        Ok(())
    }

    pub fn finish(mut self) -> LaidOut {
        self.end_page();
        LaidOut {
            pages: self.pages,
            trap_pages: self.trap_pages,
        }
    }
}

pub(crate) fn layout(
    options: &EncoderOptions,
    segments: &[Segment<'_>],
) -> Result<LaidOut, EncodeError> {
    let mut writer = PageWriter::new(options);
    for segment in segments {
        match segment {
            Segment::Plain(text) => writer.write_plain(text),
            Segment::Trap {
                index,
                visible,
                actual,
            } => writer.write_trap(*index, visible, actual)?,
        }
    }
    Ok(writer.finish())
}

pub(crate) fn utf16be_with_bom(s: &str) -> Vec<u8> {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_page() -> EncoderOptions {
        // 10 chars per line, 3 lines per page.
        EncoderOptions {
            font_size: 10.0,
            margin: 10.0,
            page_width: 80.0,
            page_height: 56.0,
        }
    }

    fn operators(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.operator.as_str()).collect()
    }

    #[test]
    fn test_geometry() {
        let options = small_page();
        let writer = PageWriter::new(&options);
        assert_eq!(writer.chars_per_line(), 10);
        assert_eq!(writer.lines_per_page(), 3);
    }

    #[test]
    fn test_page_starts_with_text_state() {
        let laid = layout(&EncoderOptions::default(), &[Segment::Plain("Hi")]).unwrap();
        assert_eq!(laid.pages.len(), 1);
        assert_eq!(operators(&laid.pages[0]), vec!["BT", "Tf", "TL", "Td", "Tj", "ET"]);
    }

    #[test]
    fn test_wraps_and_paginates() {
        let options = small_page();
        let text = "aaaa bbbb cccc dddd eeee ffff gggg";
        let laid = layout(&options, &[Segment::Plain(text)]).unwrap();
        assert!(laid.pages.len() >= 2);
    }

    #[test]
    fn test_trap_is_marked_content() {
        let laid = layout(
            &EncoderOptions::default(),
            &[
                Segment::Plain("There are "),
                Segment::Trap {
                    index: 0,
                    visible: "6",
                    actual: "11",
                },
                Segment::Plain(" apples."),
            ],
        )
        .unwrap();
        let ops = operators(&laid.pages[0]);
        let bdc = ops.iter().position(|op| *op == "BDC").unwrap();
        assert_eq!(ops[bdc + 1], "Tj");
        assert_eq!(ops[bdc + 2], "EMC");
        assert_eq!(laid.trap_pages, vec![1]);
    }

    #[test]
    fn test_trap_moves_to_next_page_instead_of_splitting() {
        let options = small_page();
        let laid = layout(
            &options,
            &[
                Segment::Plain("line one\nline two\nline"),
                Segment::Trap {
                    index: 0,
                    visible: "abcdefghij klm",
                    actual: "x",
                },
            ],
        )
        .unwrap();
        assert_eq!(laid.trap_pages, vec![2]);
    }

    #[test]
    fn test_trap_longer_than_a_page_rejected() {
        let options = small_page();
        let visible = "x".repeat(40);
        let err = layout(
            &options,
            &[Segment::Trap {
                index: 3,
                visible: &visible,
                actual: "y",
            }],
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::TrapTooLong { index: 3 }));
    }

    #[test]
    fn test_utf16_bom() {
        assert_eq!(utf16be_with_bom("A"), vec![0xFE, 0xFF, 0x00, 0x41]);
        assert_eq!(utf16be_with_bom(""), vec![0xFE, 0xFF]);
    }
}
