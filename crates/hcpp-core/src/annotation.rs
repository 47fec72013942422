//! Persisted annotation records for the code-classification loop.

use serde::{Deserialize, Serialize};

use crate::verdict::{GroundTruth, Verdict};

/// Prefix written in place of a model response when the external call failed.
pub const ERROR_MARKER: &str = "[ERROR]";

/// Document field names shared by every collection and by store filters.
pub mod fields {
    pub const PACKAGE: &str = "packagename";
    pub const RESPONSE: &str = "response";
    pub const VERDICT: &str = "verdict";
    pub const BINARY_LABEL: &str = "binary_label";
    pub const GROUND_TRUTH: &str = "ground_truth";
    pub const BINARY_GT: &str = "binary_gt";
    pub const PP_SEGMENTS: &str = "pp_segments";
    pub const REQUESTED_PERMISSIONS: &str = "requested_permissions";
    pub const RATIONALE_OVERALL: &str = "rationale_overall";
    pub const RATIONALE_REASONING: &str = "rationale_reasoning";
    pub const RATIONALE_FLAGS: &str = "rationale_flags";
}

/// One classified work unit, written once and never updated.
///
/// The presence of a record for a package is the "done" signal for the
/// annotation loop, whether the response was a real answer or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(rename = "packagename")]
    pub package: String,
    /// Raw model output, or `[ERROR] ...` when the call failed.
    pub response: String,
    pub verdict: Verdict,
    pub binary_label: i8,
    pub ground_truth: GroundTruth,
    pub binary_gt: i8,
    pub model: String,
    /// ISO 8601 timestamp string.
    pub annotated_at: String,
}

impl AnnotationRecord {
    /// Build a record, deriving the verdict from the response text.
    ///
    /// Error responses are never parsed: they are always `Undetermined`, even
    /// if the error body happens to contain "No" (e.g. "Not Found").
    pub fn new(
        package: impl Into<String>,
        response: impl Into<String>,
        ground_truth: GroundTruth,
        model: impl Into<String>,
        annotated_at: impl Into<String>,
    ) -> Self {
        let response = response.into();
        let verdict = if response.starts_with(ERROR_MARKER) {
            Verdict::Undetermined
        } else {
            Verdict::parse(&response)
        };
        Self {
            package: package.into(),
            response,
            verdict,
            binary_label: verdict.code(),
            ground_truth,
            binary_gt: ground_truth.code(),
            model: model.into(),
            annotated_at: annotated_at.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.starts_with(ERROR_MARKER)
    }

    /// Binary (truth, prediction) pair for scoring, positive = 1.
    ///
    /// `None` when the ground truth is unknown. An undetermined prediction is
    /// scored as the opposite of the ground truth, i.e. always wrong.
    pub fn scored_pair(&self) -> Option<(u8, u8)> {
        let truth = match self.ground_truth {
            GroundTruth::Positive => 1,
            GroundTruth::Negative => 0,
            GroundTruth::Unknown => return None,
        };
        let pred = match self.verdict {
            Verdict::Yes => 1,
            Verdict::No => 0,
            Verdict::Undetermined => 1 - truth,
        };
        Some((truth, pred))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(response: &str, gt: GroundTruth) -> AnnotationRecord {
        AnnotationRecord::new("com.example", response, gt, "codellama:34b", "2026-01-01T00:00:00Z")
    }

    #[test]
    fn derives_verdict_and_codes() {
        let r = record("1. Answer: Yes\n2. WebView loads the policy", GroundTruth::Positive);
        assert_eq!(r.verdict, Verdict::Yes);
        assert_eq!(r.binary_label, 1);
        assert_eq!(r.binary_gt, 1);
        assert!(!r.is_error());
    }

    #[test]
    fn error_response_is_undetermined() {
        let r = record("[ERROR] 404: Not Found", GroundTruth::Negative);
        assert!(r.is_error());
        assert_eq!(r.verdict, Verdict::Undetermined);
        assert_eq!(r.binary_label, -1);
    }

    #[test]
    fn scored_pair_skips_unknown_truth() {
        assert_eq!(record("Yes", GroundTruth::Unknown).scored_pair(), None);
    }

    #[test]
    fn undetermined_scores_as_wrong() {
        assert_eq!(record("Maybe", GroundTruth::Positive).scored_pair(), Some((1, 0)));
        assert_eq!(record("Maybe", GroundTruth::Negative).scored_pair(), Some((0, 1)));
        assert_eq!(record("No", GroundTruth::Negative).scored_pair(), Some((0, 0)));
    }

    #[test]
    fn json_uses_packagename_key() {
        let r = record("No", GroundTruth::Negative);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v[fields::PACKAGE], "com.example");
        assert_eq!(v[fields::VERDICT], "no");
        assert_eq!(v[fields::BINARY_GT], 0);
        let back: AnnotationRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
