//! Final flag decision for a scored submission.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::interview::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagDecision {
    /// Score at or below the threshold; no interview.
    Accepted,
    /// Above the threshold and the interview has not concluded yet.
    PendingInterview,
    /// Interview verdict was legitimate.
    NotFlagged,
    Flagged,
}

impl FlagDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagDecision::Accepted => "accepted",
            FlagDecision::PendingInterview => "pending_interview",
            FlagDecision::NotFlagged => "not_flagged",
            FlagDecision::Flagged => "flagged",
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, FlagDecision::Flagged)
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, FlagDecision::PendingInterview)
    }
}

impl fmt::Display for FlagDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(FlagDecision::Accepted),
            "pending_interview" => Ok(FlagDecision::PendingInterview),
            "not_flagged" => Ok(FlagDecision::NotFlagged),
            "flagged" => Ok(FlagDecision::Flagged),
            other => Err(format!("unknown flag decision '{}'", other)),
        }
    }
}

/// Where the interview stands when the decision is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewResolution {
    /// Offered or in progress, no outcome yet.
    NotHeld,
    Skipped,
    Verdict(Verdict),
}

/// Whether `score` requires an interview.
pub fn requires_interview(score: f64, threshold: f64) -> bool {
    score > threshold
}

pub fn decide(score: f64, threshold: f64, resolution: InterviewResolution) -> FlagDecision {
    if !requires_interview(score, threshold) {
        return FlagDecision::Accepted;
    }
    match resolution {
        InterviewResolution::NotHeld => FlagDecision::PendingInterview,
        InterviewResolution::Skipped => FlagDecision::Flagged,
        InterviewResolution::Verdict(Verdict::Legitimate) => FlagDecision::NotFlagged,
        InterviewResolution::Verdict(Verdict::LikelyCheated | Verdict::Unclear) => {
            FlagDecision::Flagged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        let t = 0.5;
        assert_eq!(decide(0.5, t, InterviewResolution::NotHeld), FlagDecision::Accepted);
        assert_eq!(decide(0.2, t, InterviewResolution::Skipped), FlagDecision::Accepted);
        assert_eq!(decide(0.8, t, InterviewResolution::Skipped), FlagDecision::Flagged);
        assert_eq!(
            decide(0.8, t, InterviewResolution::Verdict(Verdict::Legitimate)),
            FlagDecision::NotFlagged
        );
        assert_eq!(
            decide(0.8, t, InterviewResolution::Verdict(Verdict::LikelyCheated)),
            FlagDecision::Flagged
        );
        assert_eq!(
            decide(0.8, t, InterviewResolution::Verdict(Verdict::Unclear)),
            FlagDecision::Flagged
        );
        assert_eq!(
            decide(0.8, t, InterviewResolution::NotHeld),
            FlagDecision::PendingInterview
        );
    }

    #[test]
    fn test_round_trip_str() {
        for d in [
            FlagDecision::Accepted,
            FlagDecision::PendingInterview,
            FlagDecision::NotFlagged,
            FlagDecision::Flagged,
        ] {
            assert_eq!(d.as_str().parse::<FlagDecision>().unwrap(), d);
        }
        assert!(!FlagDecision::PendingInterview.is_final());
    }
}
