//! Sweep pipeline: reads embedding records, aggregates them per mode, and
//! runs every requested classifier family over each feature matrix.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use hcpp_ml::{AggregationMode, FeatureSpec, SweepConfig, SweepResult, aggregate, families_for, load_records, run_sweep};
use serde::Serialize;

pub struct SweepRequest<'a> {
    pub features: &'a Path,
    pub spec: FeatureSpec,
    pub family: &'a str,
    pub modes: Vec<AggregationMode>,
    pub config: SweepConfig,
}

#[derive(Serialize)]
pub struct SweepReport {
    pub generated_at: String,
    pub features: String,
    pub records: usize,
    pub n_splits: usize,
    pub seed: u64,
    pub results: Vec<SweepResult>,
    pub elapsed_secs: f64,
}

/// Run the full sweep: load records, aggregate each mode, sweep each family.
pub fn run_sweep_pipeline(req: &SweepRequest<'_>) -> anyhow::Result<SweepReport> {
    let start = Instant::now();
    let families = families_for(req.family)
        .with_context(|| format!("unknown model family '{}' (expected lr, rf, svm or all)", req.family))?;

    let records = load_records(req.features, &req.spec)
        .with_context(|| format!("loading features from {}", req.features.display()))?;
    eprintln!("  Read {} records from {}", records.len(), req.features.display());

    let mut results = Vec::with_capacity(req.modes.len() * families.len());
    for &mode in &req.modes {
        let matrix = aggregate(&records, req.spec.width, mode);
        eprintln!("  {mode}: {} rows, {}", matrix.len(), matrix.description);
        for family in &families {
            let t = Instant::now();
            let result = run_sweep(&matrix, family.as_ref(), &req.config)
                .with_context(|| format!("sweeping {} on {mode} features", family.name()))?;
            eprintln!(
                "    {:<20} macro-F1 {:.4}  ({} candidates, {:.1}s)",
                result.family,
                result.cv_macro_f1,
                result.candidates,
                t.elapsed().as_secs_f64()
            );
            results.push(result);
        }
    }

    Ok(SweepReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        features: req.features.display().to_string(),
        records: records.len(),
        n_splits: req.config.n_splits,
        seed: req.config.seed,
        results,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// Write the report as pretty JSON.
pub fn write_report(report: &SweepReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialising sweep report")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_features(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("features.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        for i in 0..10 {
            let x = i as f32 * 0.1;
            // Positives sit near +1, negatives near -1; positives carry two segments.
            writeln!(
                f,
                r#"{{"package":"com.pos{i}","class":1,"emb":[{a},{b},{a},{b}]}}"#,
                a = 1.0 + x,
                b = 1.0 - x
            )
            .unwrap();
            writeln!(
                f,
                r#"{{"package":"com.neg{i}","class":0,"emb":[{a},{b}]}}"#,
                a = -1.0 - x,
                b = -1.0 + x
            )
            .unwrap();
        }
        path
    }

    #[test]
    fn sweeps_each_mode_and_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let features = write_features(dir.path());
        let req = SweepRequest {
            features: &features,
            spec: FeatureSpec {
                field: "emb".into(),
                width: 2,
            },
            family: "lr",
            modes: vec![AggregationMode::Averaged, AggregationMode::Padded],
            config: SweepConfig::default(),
        };
        let report = run_sweep_pipeline(&req).unwrap();
        assert_eq!(report.records, 20);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].mode, AggregationMode::Averaged);
        assert_eq!(report.results[1].mode, AggregationMode::Padded);
        assert!(report.results.iter().all(|r| r.family == "logistic_regression"));
        assert!(report.results[0].cv_macro_f1 > 0.9);

        let out = dir.path().join("report.json");
        write_report(&report, &out).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(parsed["results"][1]["mode"], "padded");
    }

    #[test]
    fn unknown_family_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let features = write_features(dir.path());
        let req = SweepRequest {
            features: &features,
            spec: FeatureSpec::new("emb"),
            family: "knn",
            modes: vec![AggregationMode::Averaged],
            config: SweepConfig::default(),
        };
        let err = run_sweep_pipeline(&req).err().unwrap();
        assert!(err.to_string().contains("unknown model family"));
    }
}
