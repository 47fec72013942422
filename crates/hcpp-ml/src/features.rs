//! Embedding feature loading and aggregation.
//!
//! Each input record carries a concatenation of fixed-width sentence
//! embeddings (one per policy or code segment). Records are reshaped into
//! segments and aggregated into one row per app, either by mean pooling or
//! by zero padding to the dataset's longest record.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::MlError;

/// Width of one all-MiniLM-L6-v2 sentence embedding.
pub const SEGMENT_WIDTH: usize = 384;

/// Field holding the package identifier in each JSONL record.
pub const PACKAGE_FIELD: &str = "package";
/// Field holding the binary class label in each JSONL record.
pub const CLASS_FIELD: &str = "class";

/// Which field holds the embedding and how wide one segment is.
#[derive(Debug, Clone)]
pub struct FeatureSpec {
    pub field: String,
    pub width: usize,
}

impl FeatureSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            width: SEGMENT_WIDTH,
        }
    }
}

/// One app: identifier, binary label, and its concatenated segment embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub package: String,
    pub label: u8,
    /// Flat embedding; length is a positive multiple of the segment width.
    pub embedding: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn segment_count(&self, width: usize) -> usize {
        self.embedding.len() / width
    }

    pub fn segments(&self, width: usize) -> impl Iterator<Item = &[f32]> {
        self.embedding.chunks_exact(width)
    }
}

/// How segment embeddings are combined into one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    Averaged,
    Padded,
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Averaged => "averaged",
            Self::Padded => "padded",
        })
    }
}

/// Row-aligned feature matrix and labels.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub rows: Vec<Vec<f32>>,
    pub labels: Vec<u8>,
    pub packages: Vec<String>,
    pub mode: AggregationMode,
    /// Human-readable mode and dimensionality, e.g. `averaged (384-d)`.
    pub description: String,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row width; 0 for an empty matrix.
    pub fn dim(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

/// Read a JSONL record file, preserving line order.
pub fn load_records(path: &Path, spec: &FeatureSpec) -> Result<Vec<EmbeddingRecord>, MlError> {
    let file = File::open(path)?;
    let records = parse_records(BufReader::new(file), spec)?;
    info!(
        path = %path.display(),
        records = records.len(),
        field = %spec.field,
        "loaded embedding records"
    );
    Ok(records)
}

/// Parse JSONL records from any reader. Blank lines are ignored.
///
/// The first invalid embedding aborts the whole load.
pub fn parse_records<R: BufRead>(reader: R, spec: &FeatureSpec) -> Result<Vec<EmbeddingRecord>, MlError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(parse_line(&line, idx + 1, spec)?);
    }
    Ok(out)
}

fn parse_line(line: &str, line_no: usize, spec: &FeatureSpec) -> Result<EmbeddingRecord, MlError> {
    let obj: Value = serde_json::from_str(line).map_err(|source| MlError::Json {
        line: line_no,
        source,
    })?;
    let missing = |field: &str| MlError::MissingField {
        line: line_no,
        field: field.to_string(),
    };

    let package = obj
        .get(PACKAGE_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(PACKAGE_FIELD))?
        .to_string();

    let class = obj.get(CLASS_FIELD).ok_or_else(|| missing(CLASS_FIELD))?;
    let label = match class.as_u64() {
        Some(0) => 0,
        Some(1) => 1,
        _ => {
            return Err(MlError::InvalidLabel {
                package,
                value: class.to_string(),
            });
        }
    };

    let embedding = obj
        .get(&spec.field)
        .and_then(Value::as_array)
        .ok_or_else(|| missing(&spec.field))?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| missing(&spec.field))?;

    if embedding.is_empty() || embedding.len() % spec.width != 0 {
        return Err(MlError::InvalidEmbedding {
            package,
            len: embedding.len(),
            width: spec.width,
        });
    }

    Ok(EmbeddingRecord {
        package,
        label,
        embedding,
    })
}

/// Mean-pool every record's segments into one `width`-wide row.
pub fn mean_pool(records: &[EmbeddingRecord], width: usize) -> FeatureMatrix {
    let rows = records
        .iter()
        .map(|r| {
            let mut sum = vec![0.0f32; width];
            let mut count = 0usize;
            for seg in r.segments(width) {
                for (acc, &v) in sum.iter_mut().zip(seg) {
                    *acc += v;
                }
                count += 1;
            }
            if count > 0 {
                for v in &mut sum {
                    *v /= count as f32;
                }
            }
            sum
        })
        .collect();

    FeatureMatrix {
        rows,
        labels: records.iter().map(|r| r.label).collect(),
        packages: records.iter().map(|r| r.package.clone()).collect(),
        mode: AggregationMode::Averaged,
        description: format!("averaged ({width}-d)"),
    }
}

/// Zero-pad every record to the dataset's maximum segment count, then flatten.
///
/// All rows share width `max_segs * width`; the leading values of each row
/// are the record's original embedding and the tail is exactly zero.
pub fn zero_pad_flatten(records: &[EmbeddingRecord], width: usize) -> FeatureMatrix {
    let max_segs = records
        .iter()
        .map(|r| r.segment_count(width))
        .max()
        .unwrap_or(0);
    let dim = max_segs * width;

    let rows = records
        .iter()
        .map(|r| {
            let mut row = vec![0.0f32; dim];
            for (dst, src) in row.iter_mut().zip(&r.embedding) {
                *dst = *src;
            }
            row
        })
        .collect();

    FeatureMatrix {
        rows,
        labels: records.iter().map(|r| r.label).collect(),
        packages: records.iter().map(|r| r.package.clone()).collect(),
        mode: AggregationMode::Padded,
        description: format!("padded ({max_segs}×{width}={dim}-d)"),
    }
}

/// Aggregate with the given mode.
pub fn aggregate(records: &[EmbeddingRecord], width: usize, mode: AggregationMode) -> FeatureMatrix {
    match mode {
        AggregationMode::Averaged => mean_pool(records, width),
        AggregationMode::Padded => zero_pad_flatten(records, width),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    const W: usize = 4; // Small width for tests.

    fn spec() -> FeatureSpec {
        FeatureSpec {
            field: "embed".into(),
            width: W,
        }
    }

    fn record(package: &str, label: u8, embedding: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            package: package.into(),
            label,
            embedding,
        }
    }

    #[test]
    fn parses_lines_in_order() {
        let data = r#"{"package": "com.a", "class": 0, "embed": [1, 2, 3, 4]}

{"package": "com.b", "class": 1, "embed": [1, 2, 3, 4, 5, 6, 7, 8], "extra": true}
"#;
        let records = parse_records(Cursor::new(data), &spec()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].package, "com.a");
        assert_eq!(records[1].label, 1);
        assert_eq!(records[1].segment_count(W), 2);
    }

    #[test]
    fn bad_length_names_package() {
        let data = r#"{"package": "com.bad", "class": 0, "embed": [1, 2, 3]}"#;
        let err = parse_records(Cursor::new(data), &spec()).unwrap_err();
        match err {
            MlError::InvalidEmbedding { package, len, width } => {
                assert_eq!(package, "com.bad");
                assert_eq!(len, 3);
                assert_eq!(width, W);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_embedding_rejected() {
        let data = r#"{"package": "com.none", "class": 0, "embed": []}"#;
        assert!(matches!(
            parse_records(Cursor::new(data), &spec()),
            Err(MlError::InvalidEmbedding { .. })
        ));
    }

    #[test]
    fn non_binary_label_rejected() {
        let data = r#"{"package": "com.x", "class": 2, "embed": [1, 2, 3, 4]}"#;
        assert!(matches!(
            parse_records(Cursor::new(data), &spec()),
            Err(MlError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn missing_field_reports_line() {
        let data = "{\"package\": \"a\", \"class\": 0, \"embed\": [1,2,3,4]}\n{\"package\": \"b\", \"class\": 1}";
        match parse_records(Cursor::new(data), &spec()).unwrap_err() {
            MlError::MissingField { line, field } => {
                assert_eq!(line, 2);
                assert_eq!(field, "embed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("apps.jsonl");
        std::fs::write(&path, "{\"package\": \"a\", \"class\": 1, \"embed\": [0, 0, 0, 1]}\n").unwrap();
        let records = load_records(&path, &spec()).unwrap();
        assert_eq!(records[0].embedding, vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn mean_pool_averages_segments() {
        let records = vec![
            record("a", 0, vec![1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 5.0, 6.0]),
            record("b", 1, vec![1.0, 1.0, 1.0, 1.0]),
        ];
        let m = mean_pool(&records, W);
        assert_eq!(m.rows[0], vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(m.rows[1], vec![1.0, 1.0, 1.0, 1.0]);
        assert_eq!(m.labels, vec![0, 1]);
        assert_eq!(m.description, "averaged (4-d)");
        assert_eq!(m.mode, AggregationMode::Averaged);
    }

    #[test]
    fn zero_pad_uses_dataset_max() {
        let records = vec![
            record("a", 0, vec![1.0; 4]),
            record("b", 1, vec![2.0; 12]),
        ];
        let m = zero_pad_flatten(&records, W);
        assert_eq!(m.dim(), 12);
        assert_eq!(&m.rows[0][..4], &[1.0; 4]);
        assert!(m.rows[0][4..].iter().all(|&v| v == 0.0));
        assert_eq!(m.rows[1], vec![2.0; 12]);
        assert_eq!(m.description, "padded (3×4=12-d)");
    }

    #[test]
    fn two_full_records_at_production_width() {
        let a: Vec<f32> = (0..768).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..768).map(|i| -(i as f32)).collect();
        let records = vec![record("a", 0, a.clone()), record("b", 1, b)];

        let avg = mean_pool(&records, SEGMENT_WIDTH);
        assert_eq!(avg.len(), 2);
        assert_eq!(avg.dim(), 384);
        assert_eq!(avg.rows[0][0], (0.0 + 384.0) / 2.0);

        let pad = zero_pad_flatten(&records, SEGMENT_WIDTH);
        assert_eq!(pad.dim(), 768);
        assert_eq!(pad.rows[0], a);
        assert_eq!(pad.labels, vec![0, 1]);
    }

    #[test]
    fn zero_pad_truncates_a_ragged_tail() {
        // Built by hand, bypassing the loader's length check.
        let records = vec![
            record("a", 0, vec![1.0; W]),
            record("b", 1, vec![2.0; W + 3]),
        ];
        let m = zero_pad_flatten(&records, W);
        assert_eq!(m.rows[1], vec![2.0; W]);
    }

    #[test]
    fn mode_display_honours_width() {
        assert_eq!(format!("{:<9}|", AggregationMode::Padded), "padded   |");
        assert_eq!(format!("{:>9}", AggregationMode::Averaged), " averaged");
    }

    #[test]
    fn empty_dataset_aggregates_to_empty_matrix() {
        assert!(mean_pool(&[], W).is_empty());
        assert_eq!(zero_pad_flatten(&[], W).dim(), 0);
    }

    fn arb_records() -> impl Strategy<Value = Vec<EmbeddingRecord>> {
        proptest::collection::vec(
            (1usize..6, 0u8..2).prop_flat_map(|(segs, label)| {
                proptest::collection::vec(-10.0f32..10.0, segs * W)
                    .prop_map(move |embedding| EmbeddingRecord {
                        package: "p".into(),
                        label,
                        embedding,
                    })
            }),
            1..8,
        )
    }

    proptest! {
        #[test]
        fn mean_pool_width_is_constant(records in arb_records()) {
            let m = mean_pool(&records, W);
            prop_assert!(m.rows.iter().all(|r| r.len() == W));
            prop_assert_eq!(m.labels.len(), records.len());
        }

        #[test]
        fn zero_pad_preserves_prefix_and_zero_tail(records in arb_records()) {
            let max_segs = records.iter().map(|r| r.segment_count(W)).max().unwrap();
            let m = zero_pad_flatten(&records, W);
            for (row, rec) in m.rows.iter().zip(&records) {
                prop_assert_eq!(row.len(), max_segs * W);
                prop_assert_eq!(&row[..rec.embedding.len()], rec.embedding.as_slice());
                prop_assert!(row[rec.embedding.len()..].iter().all(|&v| v == 0.0));
            }
        }
    }
}
