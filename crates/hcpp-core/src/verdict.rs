//! Discrete labels derived from free-text classifier output and reference lists.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classifier verdict parsed out of a free-text response.
///
/// Parsing is a case-sensitive substring search: `"Yes"` is checked first,
/// then `"No"`. A response containing neither is [`Verdict::Undetermined`].
/// Substrings inside longer words match too (`"Nothing"` reads as `No`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Yes,
    No,
    Undetermined,
}

impl Verdict {
    pub fn parse(response: &str) -> Self {
        if response.contains("Yes") {
            Self::Yes
        } else if response.contains("No") {
            Self::No
        } else {
            Self::Undetermined
        }
    }

    /// Numeric encoding persisted next to the verdict: 1 / 0 / -1.
    pub fn code(self) -> i8 {
        match self {
            Self::Yes => 1,
            Self::No => 0,
            Self::Undetermined => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ground-truth label looked up from the positive/negative reference lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundTruth {
    Positive,
    Negative,
    /// Package is on neither list.
    Unknown,
}

impl GroundTruth {
    /// Numeric encoding, aligned with [`Verdict::code`].
    pub fn code(self) -> i8 {
        match self {
            Self::Positive => 1,
            Self::Negative => 0,
            Self::Unknown => -1,
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for GroundTruth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_no_parses_negative() {
        assert_eq!(Verdict::parse("Answer: No, because..."), Verdict::No);
    }

    #[test]
    fn maybe_is_undetermined() {
        let v = Verdict::parse("Maybe");
        assert_eq!(v, Verdict::Undetermined);
        assert_eq!(v.code(), -1);
    }

    #[test]
    fn yes_wins_over_no() {
        assert_eq!(Verdict::parse("No wait. Yes."), Verdict::Yes);
        assert_eq!(Verdict::parse("[Yes] Not shared"), Verdict::Yes);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(Verdict::parse("yes"), Verdict::Undetermined);
        assert_eq!(Verdict::parse("NO"), Verdict::Undetermined);
    }

    #[test]
    fn substring_inside_words_matches() {
        assert_eq!(Verdict::parse("Nothing to report"), Verdict::No);
    }

    #[test]
    fn codes_align() {
        assert_eq!(Verdict::Yes.code(), GroundTruth::Positive.code());
        assert_eq!(Verdict::No.code(), GroundTruth::Negative.code());
        assert_eq!(Verdict::Undetermined.code(), GroundTruth::Unknown.code());
    }

    #[test]
    fn serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&Verdict::Undetermined).unwrap(),
            "\"undetermined\""
        );
        let gt: GroundTruth = serde_json::from_str("\"positive\"").unwrap();
        assert_eq!(gt, GroundTruth::Positive);
    }
}
