//! Privacy-policy disclosure records and the overall-label function.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Overall disclosure label for one policy across its required capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisclosureLevel {
    #[serde(rename = "Comprehensive Disclosure")]
    Comprehensive,
    #[serde(rename = "Partial Disclosure")]
    Partial,
    #[serde(rename = "Non Disclosure")]
    Non,
}

impl DisclosureLevel {
    /// Combine per-capability flags into one label.
    ///
    /// Zero disclosed → `Non`, all disclosed → `Comprehensive`, otherwise
    /// `Partial`. The zero check comes first, so an empty flag list is `Non`.
    pub fn from_flags(flags: &[bool]) -> Self {
        let disclosed = flags.iter().filter(|&&f| f).count();
        if disclosed == 0 {
            Self::Non
        } else if disclosed == flags.len() {
            Self::Comprehensive
        } else {
            Self::Partial
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comprehensive => "Comprehensive Disclosure",
            Self::Partial => "Partial Disclosure",
            Self::Non => "Non Disclosure",
        }
    }
}

impl fmt::Display for DisclosureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-package policy document accumulated across the ingestion steps.
///
/// Every step fills one group of optional fields; a missing field means the
/// step has not run for this package yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "packagename")]
    pub package: String,
    /// Policy text chunks (≤250 words) or per-screenshot OCR text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pp_segments: Option<Vec<String>>,
    /// Whitelisted capabilities read off the permission dialog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_overall: Option<DisclosureLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_reasoning: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_flags: Option<Vec<bool>>,
}

impl PolicyDocument {
    pub fn with_segments(package: impl Into<String>, segments: Vec<String>) -> Self {
        Self {
            package: package.into(),
            pp_segments: Some(segments),
            ..Default::default()
        }
    }

    pub fn has_segments(&self) -> bool {
        self.pp_segments.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_permissions(&self) -> bool {
        self.requested_permissions
            .as_ref()
            .is_some_and(|p| !p.is_empty())
    }
}

/// Outcome of checking one capability against every policy segment.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityAssessment {
    pub capability: String,
    pub disclosed: bool,
    /// Concatenated Yes-responses; empty when not disclosed.
    pub evidence: String,
}

/// Disclosure result for one package.
#[derive(Debug, Clone, PartialEq)]
pub struct DisclosureRecord {
    pub package: String,
    pub capabilities: Vec<String>,
    pub flags: Vec<bool>,
    pub reasoning: Vec<String>,
    pub overall: DisclosureLevel,
}

impl DisclosureRecord {
    pub fn from_assessments(package: impl Into<String>, assessments: Vec<CapabilityAssessment>) -> Self {
        let mut capabilities = Vec::with_capacity(assessments.len());
        let mut flags = Vec::with_capacity(assessments.len());
        let mut reasoning = Vec::with_capacity(assessments.len());
        for a in assessments {
            capabilities.push(a.capability);
            flags.push(a.disclosed);
            reasoning.push(a.evidence);
        }
        let overall = DisclosureLevel::from_flags(&flags);
        Self {
            package: package.into(),
            capabilities,
            flags,
            reasoning,
            overall,
        }
    }
}

/// Counts of overall labels across a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisclosureTally {
    pub comprehensive: usize,
    pub partial: usize,
    pub non: usize,
}

impl DisclosureTally {
    pub fn record(&mut self, level: DisclosureLevel) {
        match level {
            DisclosureLevel::Comprehensive => self.comprehensive += 1,
            DisclosureLevel::Partial => self.partial += 1,
            DisclosureLevel::Non => self.non += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.comprehensive + self.partial + self.non
    }

    /// Share of `count` in percent; 0 for an empty tally.
    pub fn percent(&self, count: usize) -> f64 {
        match self.total() {
            0 => 0.0,
            total => count as f64 / total as f64 * 100.0,
        }
    }
}

impl FromIterator<DisclosureLevel> for DisclosureTally {
    fn from_iter<I: IntoIterator<Item = DisclosureLevel>>(iter: I) -> Self {
        let mut tally = Self::default();
        for level in iter {
            tally.record(level);
        }
        tally
    }
}

impl fmt::Display for DisclosureTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total {} privacy policies: {} ({:.1}%) comprehensive; {} ({:.1}%) partial; {} ({:.1}%) non disclosure",
            self.total(),
            self.comprehensive,
            self.percent(self.comprehensive),
            self.partial,
            self.percent(self.partial),
            self.non,
            self.percent(self.non),
        )
    }
}
