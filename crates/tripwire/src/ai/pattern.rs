//! Deterministic offline suggester.
//!
//! Perturbs numbers (+5) and swaps words for their opposites, spreading at
//! most `max_traps` changes evenly across the text.

use super::{Suggestion, SuggesterError, SuggestionService};
use crate::diff::{tokenize, TokenClass};

pub const DEFAULT_MAX_TRAPS: usize = 5;

/// Numbers are shifted by this amount.
const NUMBER_OFFSET: u64 = 5;

const SWAPS: &[(&str, &str)] = &[
    ("increase", "decrease"),
    ("maximum", "minimum"),
    ("before", "after"),
    ("first", "second"),
    ("left", "right"),
    ("more", "fewer"),
    ("above", "below"),
    ("always", "never"),
    ("include", "exclude"),
    ("largest", "smallest"),
    ("positive", "negative"),
    ("north", "south"),
];

pub struct PatternSuggester {
    max_traps: usize,
}

impl Default for PatternSuggester {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRAPS)
    }
}

impl PatternSuggester {
    pub fn new(max_traps: usize) -> Self {
        Self { max_traps }
    }

    pub fn rewrite(&self, text: &str) -> String {
        let tokens = tokenize(text);
        let candidates: Vec<(usize, String)> = tokens
            .iter()
            .enumerate()
            .filter_map(|(i, token)| {
                let replacement = match token.class {
                    TokenClass::Digits => shift_number(token.text),
                    TokenClass::Letters => swap_word(token.text),
                    _ => None,
                };
                replacement.map(|r| (i, r))
            })
            .collect();

        let chosen = spread(candidates, self.max_traps);
        let mut out = String::with_capacity(text.len() + 8);
        let mut next = chosen.iter().peekable();
        for (i, token) in tokens.iter().enumerate() {
            match next.peek() {
                Some((idx, replacement)) if *idx == i => {
                    out.push_str(replacement);
                    next.next();
                }
                _ => out.push_str(token.text),
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl SuggestionService for PatternSuggester {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn suggest(&self, instructions: &str) -> Result<Suggestion, SuggesterError> {
        Ok(Suggestion {
            text: self.rewrite(instructions),
        })
    }
}

fn shift_number(digits: &str) -> Option<String> {
    // Leading zeros and very long runs (ids, years in codes) are left alone.
    if digits.len() > 9 || (digits.len() > 1 && digits.starts_with('0')) {
        return None;
    }
    let n: u64 = digits.parse().ok()?;
    Some((n + NUMBER_OFFSET).to_string())
}

fn swap_word(word: &str) -> Option<String> {
    let lower = word.to_lowercase();
    let opposite = SWAPS.iter().find_map(|(a, b)| {
        if *a == lower {
            Some(*b)
        } else if *b == lower {
            Some(*a)
        } else {
            None
        }
    })?;
    Some(match_case(word, opposite))
}

fn match_case(model: &str, word: &str) -> String {
    let mut chars = model.chars();
    let first_upper = chars.next().is_some_and(char::is_uppercase);
    let rest_upper = model.chars().count() > 1 && chars.all(char::is_uppercase);

    if first_upper && rest_upper {
        word.to_uppercase()
    } else if first_upper {
        let mut out = String::with_capacity(word.len());
        let mut w = word.chars();
        if let Some(c) = w.next() {
            out.extend(c.to_uppercase());
        }
        out.extend(w);
        out
    } else {
        word.to_string()
    }
}

/// At most `limit` items, evenly spaced, in original order.
fn spread<T>(items: Vec<T>, limit: usize) -> Vec<T> {
    let len = items.len();
    if len <= limit {
        return items;
    }
    if limit == 0 {
        return Vec::new();
    }
    let picks: Vec<usize> = (0..limit).map(|k| k * len / limit).collect();
    items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| picks.contains(i))
        .map(|(_, item)| item)
        .collect()
}
