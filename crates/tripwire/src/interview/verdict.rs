//! Verdict tokens emitted by the interviewing agent.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VERDICT_MARKER: &str = "VERDICT:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    LikelyCheated,
    Unclear,
    Legitimate,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::LikelyCheated => "likely_cheated",
            Verdict::Unclear => "unclear",
            Verdict::Legitimate => "legitimate",
        }
    }

    /// The token the agent is instructed to emit.
    pub fn token(&self) -> &'static str {
        match self {
            Verdict::LikelyCheated => "LIKELY_CHEATED",
            Verdict::Unclear => "UNCLEAR",
            Verdict::Legitimate => "LEGITIMATE",
        }
    }

    pub fn from_token(token: &str) -> Option<Verdict> {
        match token.to_ascii_uppercase().as_str() {
            "LIKELY_CHEATED" => Some(Verdict::LikelyCheated),
            "UNCLEAR" => Some(Verdict::Unclear),
            "LEGITIMATE" => Some(Verdict::Legitimate),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "likely_cheated" => Ok(Verdict::LikelyCheated),
            "unclear" => Ok(Verdict::Unclear),
            "legitimate" => Ok(Verdict::Legitimate),
            other => Err(format!("unknown verdict '{}'", other)),
        }
    }
}

/// Finds the terminating marker and the token that follows it.
#[derive(Debug, Clone)]
pub struct VerdictParser {
    marker: String,
    pattern: Regex,
}

impl VerdictParser {
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"{}\s*([A-Za-z_]*)", regex::escape(marker)))?;
        Ok(Self {
            marker: marker.to_string(),
            pattern,
        })
    }

    pub fn contains_marker(&self, utterance: &str) -> bool {
        !self.marker.is_empty() && utterance.contains(&self.marker)
    }

    /// `None` when the marker is absent. A marker followed by anything other
    /// than a known token reads as [`Verdict::Unclear`].
    pub fn parse(&self, utterance: &str) -> Option<Verdict> {
        if !self.contains_marker(utterance) {
            return None;
        }
        let verdict = self
            .pattern
            .captures_iter(utterance)
            .last()
            .and_then(|caps| caps.get(1))
            .and_then(|token| Verdict::from_token(token.as_str()))
            .unwrap_or(Verdict::Unclear);
        Some(verdict)
    }
}
