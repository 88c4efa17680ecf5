//! Token segmentation for the diff engine.
//!
//! Runs of ASCII digits and runs of letters form single tokens; every other
//! character (whitespace, punctuation, symbols) is a token on its own.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Digits,
    Letters,
    Whitespace,
    Symbol,
}

impl TokenClass {
    fn of(c: char) -> Self {
        if c.is_ascii_digit() {
            TokenClass::Digits
        } else if c.is_alphabetic() {
            TokenClass::Letters
        } else if c.is_whitespace() {
            TokenClass::Whitespace
        } else {
            TokenClass::Symbol
        }
    }

    fn is_run(&self) -> bool {
        matches!(self, TokenClass::Digits | TokenClass::Letters)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub class: TokenClass,
    /// Offset of the first character, in chars.
    pub start: usize,
    /// Length in chars.
    pub len: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    let mut char_pos = 0;

    while let Some((byte_start, c)) = chars.next() {
        let class = TokenClass::of(c);
        let mut byte_end = byte_start + c.len_utf8();
        let mut len = 1;

        if class.is_run() {
            while let Some(&(idx, next)) = chars.peek() {
                if TokenClass::of(next) != class {
                    break;
                }
                byte_end = idx + next.len_utf8();
                len += 1;
                chars.next();
            }
        }

        tokens.push(Token {
            text: &input[byte_start..byte_end],
            class,
            start: char_pos,
            len,
        });
        char_pos += len;
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<&str> {
        tokenize(input).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_runs_and_singles() {
        assert_eq!(
            texts("There are 6 apples."),
            vec!["There", " ", "are", " ", "6", " ", "apples", "."]
        );
    }

    #[test]
    fn test_digits_and_letters_split() {
        assert_eq!(texts("abc123def"), vec!["abc", "123", "def"]);
    }

    #[test]
    fn test_punctuation_is_single() {
        assert_eq!(texts("1,000!!"), vec!["1", ",", "000", "!", "!"]);
    }

    #[test]
    fn test_offsets_are_chars() {
        let tokens = tokenize("café 12");
        assert_eq!(tokens[0].text, "café");
        assert_eq!(tokens[0].len, 4);
        assert_eq!(tokens[1].start, 4);
        assert_eq!(tokens[2].start, 5);
        assert_eq!(tokens[2].class, TokenClass::Digits);
        assert_eq!(tokens[2].end(), 7);
    }

    #[test]
    fn test_empty() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_newline_is_whitespace_token() {
        let tokens = tokenize("a\nb");
        assert_eq!(tokens[1].class, TokenClass::Whitespace);
        assert_eq!(tokens[1].text, "\n");
    }
}
