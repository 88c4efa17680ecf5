//! Detection engine: how much of the trap set leaked into a submission.
//!
//! The score is the weighted fraction of detectable traps whose modified
//! text appears in the submission. Matching is boundary-aware so that a
//! numeric trap "11" is not found inside "110", and in fuzzy mode both
//! sides are normalized for case, whitespace and typographic punctuation
//! drift introduced by copy/paste.

use serde::{Deserialize, Serialize};

use crate::model::{Modification, ModificationKind};

/// Evidence weight per trap kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindWeights {
    pub number: f64,
    pub phrase: f64,
    pub word: f64,
    pub character: f64,
    pub punctuation: f64,
}

impl Default for KindWeights {
    fn default() -> Self {
        Self {
            number: 1.0,
            phrase: 0.9,
            word: 0.8,
            character: 0.4,
            punctuation: 0.2,
        }
    }
}

impl KindWeights {
    /// Every kind counts the same.
    pub fn uniform() -> Self {
        Self {
            number: 1.0,
            phrase: 1.0,
            word: 1.0,
            character: 1.0,
            punctuation: 1.0,
        }
    }

    pub fn weight(&self, kind: ModificationKind) -> f64 {
        match kind {
            ModificationKind::Number => self.number,
            ModificationKind::Phrase => self.phrase,
            ModificationKind::Word => self.word,
            ModificationKind::Character => self.character,
            ModificationKind::Punctuation => self.punctuation,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("number", self.number),
            ("phrase", self.phrase),
            ("word", self.word),
            ("character", self.character),
            ("punctuation", self.punctuation),
        ];
        for (name, w) in all {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("weight for '{}' must be a non-negative number", name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionOptions {
    pub weights: KindWeights,
    /// Normalize case, whitespace and quotes before matching.
    pub fuzzy: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            weights: KindWeights::default(),
            fuzzy: true,
        }
    }
}

/// Outcome for one trap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrapHit {
    pub index: usize,
    pub kind: ModificationKind,
    pub weight: f64,
    pub detectable: bool,
    pub leaked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub score: f64,
    pub leaked_count: usize,
    pub detectable_count: usize,
    pub hits: Vec<TrapHit>,
}

impl DetectionReport {
    fn empty() -> Self {
        Self {
            score: 0.0,
            leaked_count: 0,
            detectable_count: 0,
            hits: Vec::new(),
        }
    }
}

/// Scores `submission` against the trap set; always in [0, 1].
pub fn score(submission: &str, modifications: &[Modification], options: &DetectionOptions) -> f64 {
    analyze(submission, modifications, options).score
}

pub fn analyze(
    submission: &str,
    modifications: &[Modification],
    options: &DetectionOptions,
) -> DetectionReport {
    if modifications.is_empty() || submission.trim().is_empty() {
        return DetectionReport::empty();
    }

    let haystack = prepare(submission, options.fuzzy);
    let mut report = DetectionReport::empty();
    let mut leaked_weight = 0.0;
    let mut total_weight = 0.0;

    for (index, m) in modifications.iter().enumerate() {
        let weight = options.weights.weight(m.kind);
        let needle = prepare(&m.modified_text, options.fuzzy);
        // A deletion leaves nothing to search for.
        let detectable = !needle.trim().is_empty() && weight > 0.0;
        let leaked = detectable && contains_bounded(&haystack, needle.trim());

        if detectable {
            report.detectable_count += 1;
            total_weight += weight;
            if leaked {
                report.leaked_count += 1;
                leaked_weight += weight;
            }
        }

        report.hits.push(TrapHit {
            index,
            kind: m.kind,
            weight,
            detectable,
            leaked,
        });
    }

    if total_weight > 0.0 {
        report.score = (leaked_weight / total_weight).clamp(0.0, 1.0);
    }
    report
}

fn prepare(text: &str, fuzzy: bool) -> String {
    if fuzzy {
        normalize(text)
    } else {
        text.to_string()
    }
}

/// Lowercases, straightens typographic quotes and dashes, and collapses
/// whitespace runs to a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        let c = match c {
            '‘' | '’' | '‚' | '′' => '\'',
            '“' | '”' | '„' | '″' => '"',
            '–' | '—' | '‐' | '‑' | '−' => '-',
            _ => c,
        };
        out.extend(c.to_lowercase());
    }
    out
}

/// Substring search that refuses matches glued to a neighbouring
/// alphanumeric when the needle itself begins or ends alphanumerically.
fn contains_bounded(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let first_alnum = needle.chars().next().is_some_and(char::is_alphanumeric);
    let last_alnum = needle.chars().next_back().is_some_and(char::is_alphanumeric);

    let mut from = 0;
    while let Some(found) = haystack[from..].find(needle) {
        let start = from + found;
        let end = start + needle.len();

        let before_ok = !first_alnum
            || haystack[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = !last_alnum
            || haystack[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());

        if before_ok && after_ok {
            return true;
        }

        // Advance past the first char of this occurrence.
        from = start
            + haystack[start..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trap(original: &str, modified: &str, kind: ModificationKind) -> Modification {
        Modification {
            original_text: original.to_string(),
            modified_text: modified.to_string(),
            start_index: 0,
            end_index: original.chars().count(),
            page: None,
            kind,
            suggestion: None,
        }
    }

    #[test]
    fn test_single_trap_leaked_or_not() {
        let mods = vec![trap("6", "11", ModificationKind::Number)];
        let options = DetectionOptions::default();
        assert_eq!(score("I counted 11 apples in total.", &mods, &options), 1.0);
        assert_eq!(score("I counted 6 apples in total.", &mods, &options), 0.0);
    }

    #[test]
    fn test_zero_modifications_always_zero() {
        let options = DetectionOptions::default();
        assert_eq!(score("anything at all, 11 apples", &[], &options), 0.0);
        assert_eq!(score("", &[], &options), 0.0);
    }

    #[test]
    fn test_empty_submission_zero() {
        let mods = vec![trap("6", "11", ModificationKind::Number)];
        assert_eq!(score("   \n", &mods, &DetectionOptions::default()), 0.0);
    }

    #[test]
    fn test_number_boundary() {
        let mods = vec![trap("6", "11", ModificationKind::Number)];
        let options = DetectionOptions::default();
        assert_eq!(score("There were 110 apples", &mods, &options), 0.0);
        assert_eq!(score("(11)", &mods, &options), 1.0);
    }

    #[test]
    fn test_fuzzy_tolerates_case_and_whitespace() {
        let mods = vec![trap("first world", "second   World", ModificationKind::Phrase)];
        let fuzzy = DetectionOptions::default();
        assert_eq!(score("The SECOND\nworld war began", &mods, &fuzzy), 1.0);

        let strict = DetectionOptions {
            fuzzy: false,
            ..DetectionOptions::default()
        };
        assert_eq!(score("The SECOND\nworld war began", &mods, &strict), 0.0);
    }

    #[test]
    fn test_fuzzy_straightens_quotes() {
        let mods = vec![trap("it is", "it’s", ModificationKind::Phrase)];
        assert_eq!(score("I think it's fine", &mods, &DetectionOptions::default()), 1.0);
    }

    #[test]
    fn test_weighted_fraction() {
        let mods = vec![
            trap("6", "11", ModificationKind::Number),
            trap(",", ";", ModificationKind::Punctuation),
        ];
        let options = DetectionOptions::default();
        let report = analyze("11 apples", &mods, &options);
        assert_eq!(report.leaked_count, 1);
        assert_eq!(report.detectable_count, 2);
        assert!((report.score - 1.0 / 1.2).abs() < 1e-9);

        let uniform = DetectionOptions {
            weights: KindWeights::uniform(),
            fuzzy: true,
        };
        assert!((score("11 apples", &mods, &uniform) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_deletions_are_not_detectable() {
        let mods = vec![
            trap("all ", "", ModificationKind::Phrase),
            trap("6", "11", ModificationKind::Number),
        ];
        let report = analyze("11 apples", &mods, &DetectionOptions::default());
        assert_eq!(report.detectable_count, 1);
        assert!(!report.hits[0].detectable);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn test_monotonic_in_leaked_traps() {
        let mods = vec![
            trap("6", "11", ModificationKind::Number),
            trap("maximum", "minimum", ModificationKind::Word),
            trap("Friday", "Monday", ModificationKind::Word),
            trap(".", "!", ModificationKind::Punctuation),
        ];
        let options = DetectionOptions::default();
        let mut text = String::from("My essay.");
        let mut last = score(&text, &mods, &options);
        for m in &mods {
            text.push(' ');
            text.push_str(&m.modified_text);
            let next = score(&text, &mods, &options);
            assert!(next >= last, "{} dropped to {}", last, next);
            last = next;
        }
        assert!((last - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello \t  World  "), "hello world");
        assert_eq!(normalize("“Quote” — dash"), "\"quote\" - dash");
    }
}
