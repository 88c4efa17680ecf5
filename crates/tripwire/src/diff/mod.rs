//! Diff engine: the minimal ordered set of token-level modifications that
//! turns the original instructions into the suggested ones.
//!
//! Alignment is a token-level dynamic program minimising, in order,
//! the number of inserted/deleted tokens and the number of separate gaps.
//! On equal cost a match is always taken first, which pushes the remaining
//! modifications towards the end of the text.

pub mod tokenizer;

use thiserror::Error;

use crate::model::{Modification, ModificationKind};

pub use tokenizer::{tokenize, Token, TokenClass};

/// Default limit on alignment table cells (after trimming common prefix/suffix).
pub const DEFAULT_MAX_CELLS: usize = 4_000_000;

/// Longest suggestion excerpt kept on a modification for audit.
const MAX_SUGGESTION_CONTEXT: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Original text is empty")]
    EmptyOriginal,

    #[error("Texts too large to align: {cells} cells exceeds the limit of {limit}")]
    InputTooLarge { cells: usize, limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Match,
    Delete,
    Insert,
}

#[derive(Debug, Clone)]
pub struct DiffEngine {
    max_cells: usize,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CELLS)
    }
}

impl DiffEngine {
    pub fn new(max_cells: usize) -> Self {
        Self { max_cells }
    }

    /// Computes the modifications turning `original` into `suggested`.
    ///
    /// Returns an empty list when `suggested` is empty or identical to
    /// `original`: no traps are available, which is not an error.
    pub fn compute(
        &self,
        original: &str,
        suggested: &str,
    ) -> Result<Vec<Modification>, DiffError> {
        if original.is_empty() {
            return Err(DiffError::EmptyOriginal);
        }
        if suggested.is_empty() || suggested == original {
            return Ok(Vec::new());
        }

        let a = tokenize(original);
        let b = tokenize(suggested);

        let prefix = a
            .iter()
            .zip(b.iter())
            .take_while(|(x, y)| x.text == y.text)
            .count();
        let max_suffix = a.len().min(b.len()) - prefix;
        let suffix = a
            .iter()
            .rev()
            .zip(b.iter().rev())
            .take(max_suffix)
            .take_while(|(x, y)| x.text == y.text)
            .count();

        let a_mid = &a[prefix..a.len() - suffix];
        let b_mid = &b[prefix..b.len() - suffix];

        let cells = (a_mid.len() + 1).saturating_mul(b_mid.len() + 1);
        if cells > self.max_cells {
            return Err(DiffError::InputTooLarge {
                cells,
                limit: self.max_cells,
            });
        }

        let steps = align(a_mid, b_mid);

        let mut modifications = Vec::new();
        let (mut i, mut j) = (0usize, 0usize);
        let mut gap: Option<(usize, usize)> = None;

        for step in steps.iter().copied().chain(std::iter::once(Step::Match)) {
            match step {
                Step::Match => {
                    if let Some((gi, gj)) = gap.take() {
                        let ctx = GapContext {
                            original_tokens: &a_mid[gi..i],
                            suggested_tokens: &b_mid[gj..j],
                            before: (prefix + gi).checked_sub(1).and_then(|k| a.get(k)).copied(),
                            after: a.get(prefix + i).copied(),
                            suggested,
                        };
                        emit_gap(&ctx, &mut modifications);
                    }
                    i += 1;
                    j += 1;
                }
                Step::Delete => {
                    gap.get_or_insert((i, j));
                    i += 1;
                }
                Step::Insert => {
                    gap.get_or_insert((i, j));
                    j += 1;
                }
            }
        }

        Ok(modifications)
    }
}

/// Computes modifications with the default engine settings.
pub fn compute_modifications(
    original: &str,
    suggested: &str,
) -> Result<Vec<Modification>, DiffError> {
    DiffEngine::default().compute(original, suggested)
}

/// Cost of one inserted or deleted token; gap openings count in the low bits.
const EDIT: u64 = 1 << 32;

fn align(a: &[Token<'_>], b: &[Token<'_>]) -> Vec<Step> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    let idx = |i: usize, j: usize, g: usize| (i * width + j) * 2 + g;

    // cost[i][j][g]: cheapest alignment of a[i..], b[j..]; g = 1 when the
    // previous step was already inside a gap.
    let mut cost = vec![0u64; (n + 1) * width * 2];
    for i in (0..=n).rev() {
        for j in (0..=m).rev() {
            for g in 0..2 {
                if i == n && j == m {
                    continue;
                }
                let open = if g == 0 { 1 } else { 0 };
                let mut best = u64::MAX;
                if i < n && j < m && a[i].text == b[j].text {
                    best = cost[idx(i + 1, j + 1, 0)];
                }
                if i < n {
                    best = best.min(EDIT + open + cost[idx(i + 1, j, 1)]);
                }
                if j < m {
                    best = best.min(EDIT + open + cost[idx(i, j + 1, 1)]);
                }
                cost[idx(i, j, g)] = best;
            }
        }
    }

    let mut steps = Vec::with_capacity(n.max(m));
    let (mut i, mut j, mut g) = (0usize, 0usize, 0usize);
    while i < n || j < m {
        let here = cost[idx(i, j, g)];
        let open = if g == 0 { 1 } else { 0 };

        if i < n && j < m && a[i].text == b[j].text && cost[idx(i + 1, j + 1, 0)] == here {
            steps.push(Step::Match);
            i += 1;
            j += 1;
            g = 0;
        } else if i < n && EDIT + open + cost[idx(i + 1, j, 1)] == here {
            steps.push(Step::Delete);
            i += 1;
            g = 1;
        } else {
            steps.push(Step::Insert);
            j += 1;
            g = 1;
        }
    }

    steps
}

struct GapContext<'s, 't> {
    original_tokens: &'s [Token<'t>],
    suggested_tokens: &'s [Token<'t>],
    /// Unchanged original tokens on either side of the gap.
    before: Option<Token<'t>>,
    after: Option<Token<'t>>,
    suggested: &'t str,
}

fn emit_gap(ctx: &GapContext<'_, '_>, out: &mut Vec<Modification>) {
    let orig = ctx.original_tokens;
    let sugg = ctx.suggested_tokens;

    if !orig.is_empty() && orig.len() == sugg.len() {
        for (o, s) in orig.iter().zip(sugg.iter()) {
            if o.text != s.text {
                out.push(build_modification(
                    std::slice::from_ref(o),
                    std::slice::from_ref(s),
                    o.start,
                    ctx.suggested,
                ));
            }
        }
        return;
    }

    match orig.first() {
        Some(first) => out.push(build_modification(orig, sugg, first.start, ctx.suggested)),
        None => emit_insertion(ctx, out),
    }
}

/// A pure insertion has no original glyphs to carry the replacement text,
/// so it takes over the neighbouring unchanged token: the following one,
/// or the preceding one at the end of the text.
fn emit_insertion(ctx: &GapContext<'_, '_>, out: &mut Vec<Modification>) {
    let sugg = ctx.suggested_tokens;
    let inserted: String = sugg.iter().map(|t| t.text).collect();
    let kind = infer_kind(&[], sugg);
    let suggestion = sugg.first().map(|t| context_line(ctx.suggested, t.start));

    let (anchor, modified_text) = match (ctx.after, ctx.before) {
        (Some(next), _) => (next, format!("{}{}", inserted, next.text)),
        (None, Some(prev)) => {
            // The preceding token may already anchor the previous insertion.
            if let Some(last) = out.last_mut().filter(|m| m.end_index > prev.start) {
                last.modified_text.push_str(&inserted);
                return;
            }
            (prev, format!("{}{}", prev.text, inserted))
        }
        // Unreachable for a non-empty original.
        (None, None) => return,
    };

    out.push(Modification {
        original_text: anchor.text.to_string(),
        modified_text,
        start_index: anchor.start,
        end_index: anchor.start + anchor.len,
        page: None,
        kind,
        suggestion,
    });
}

fn build_modification(
    orig: &[Token<'_>],
    sugg: &[Token<'_>],
    start: usize,
    suggested: &str,
) -> Modification {
    let original_text: String = orig.iter().map(|t| t.text).collect();
    let modified_text: String = sugg.iter().map(|t| t.text).collect();
    let len: usize = orig.iter().map(|t| t.len).sum();
    let suggestion_pos = sugg.first().map(|t| t.start);

    Modification {
        original_text,
        modified_text,
        start_index: start,
        end_index: start + len,
        page: None,
        kind: infer_kind(orig, sugg),
        suggestion: suggestion_pos.map(|pos| context_line(suggested, pos)),
    }
}

/// Classifies a trap by the lexical class of the original span, or of the
/// inserted text when the original span is empty.
fn infer_kind(orig: &[Token<'_>], sugg: &[Token<'_>]) -> ModificationKind {
    let basis = if orig.is_empty() { sugg } else { orig };

    match basis {
        [] => ModificationKind::Character,
        [token] => match token.class {
            TokenClass::Digits => ModificationKind::Number,
            TokenClass::Letters if token.len == 1 => ModificationKind::Character,
            TokenClass::Letters => ModificationKind::Word,
            TokenClass::Whitespace => ModificationKind::Character,
            TokenClass::Symbol if is_punctuation(token.text) => ModificationKind::Punctuation,
            TokenClass::Symbol => ModificationKind::Character,
        },
        tokens if is_numeric_group(tokens) => ModificationKind::Number,
        _ => ModificationKind::Phrase,
    }
}

fn is_punctuation(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_punctuation() || "‘’“”–—…«»¿¡·".contains(c))
}

/// `1,000` or `3.14`: digit runs joined by separators.
fn is_numeric_group(tokens: &[Token<'_>]) -> bool {
    let edges_are_digits = matches!(tokens.first(), Some(t) if t.class == TokenClass::Digits)
        && matches!(tokens.last(), Some(t) if t.class == TokenClass::Digits);
    edges_are_digits
        && tokens
            .iter()
            .all(|t| t.class == TokenClass::Digits || t.text == "," || t.text == ".")
}

/// The suggested line containing char offset `pos`, trimmed for storage.
fn context_line(suggested: &str, pos: usize) -> String {
    let byte_pos = suggested
        .char_indices()
        .nth(pos)
        .map(|(b, _)| b)
        .unwrap_or(suggested.len());
    let line_start = suggested[..byte_pos].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let line_end = suggested[byte_pos..]
        .find('\n')
        .map(|p| byte_pos + p)
        .unwrap_or(suggested.len());

    suggested[line_start..line_end]
        .trim()
        .chars()
        .take(MAX_SUGGESTION_CONTEXT)
        .collect()
}
