//! Ground-truth and exclusion lists of package identifiers.
//!
//! Each list is a CSV file with a `PackageName` column. A package on neither
//! the positive nor the negative list has an unknown ground truth.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::error::CoreError;
use crate::verdict::GroundTruth;

/// Column holding package identifiers in every reference CSV.
pub const PACKAGE_COLUMN: &str = "PackageName";

/// Reference lists for one labelled dataset.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLists {
    pub positive: HashSet<String>,
    pub negative: HashSet<String>,
    /// Packages that are not applicable and must be skipped entirely.
    pub excluded: HashSet<String>,
}

/// Summary statistics for a set of reference lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSummary {
    pub positive: usize,
    pub negative: usize,
    pub excluded: usize,
    /// Packages present on both the positive and negative lists.
    pub conflicting: usize,
}

impl ReferenceLists {
    /// Load the three lists from CSV files. Any path may be omitted.
    pub fn load(
        positive: Option<&Path>,
        negative: Option<&Path>,
        excluded: Option<&Path>,
    ) -> Result<Self, CoreError> {
        let read = |p: Option<&Path>| -> Result<HashSet<String>, CoreError> {
            match p {
                Some(path) => Ok(read_package_column(path)?.into_iter().collect()),
                None => Ok(HashSet::new()),
            }
        };
        let lists = Self {
            positive: read(positive)?,
            negative: read(negative)?,
            excluded: read(excluded)?,
        };
        let s = lists.summary();
        info!(
            positive = s.positive,
            negative = s.negative,
            excluded = s.excluded,
            "loaded reference lists"
        );
        if s.conflicting > 0 {
            warn!(count = s.conflicting, "packages on both positive and negative lists");
        }
        Ok(lists)
    }

    /// Ground truth for a package. Negative is checked before positive.
    pub fn ground_truth(&self, package: &str) -> GroundTruth {
        if self.negative.contains(package) {
            GroundTruth::Negative
        } else if self.positive.contains(package) {
            GroundTruth::Positive
        } else {
            GroundTruth::Unknown
        }
    }

    pub fn is_excluded(&self, package: &str) -> bool {
        self.excluded.contains(package)
    }

    pub fn summary(&self) -> ReferenceSummary {
        ReferenceSummary {
            positive: self.positive.len(),
            negative: self.negative.len(),
            excluded: self.excluded.len(),
            conflicting: self.positive.intersection(&self.negative).count(),
        }
    }
}

/// Read the non-empty `PackageName` values of a CSV file, in file order.
pub fn read_package_column(path: &Path) -> Result<Vec<String>, CoreError> {
    if !path.exists() {
        return Err(CoreError::ListNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h == PACKAGE_COLUMN)
        .ok_or_else(|| CoreError::MissingColumn {
            path: path.to_path_buf(),
            column: PACKAGE_COLUMN.to_string(),
        })?;

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(v) = row.get(idx).map(str::trim)
            && !v.is_empty()
        {
            out.push(v.to_string());
        }
    }
    Ok(out)
}
