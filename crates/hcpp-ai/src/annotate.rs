//! Idempotent code-annotation loop, its evaluation, and its CSV export.
//!
//! Every `*.java` file under the source root is a work unit belonging to the
//! package named by its first path component. The first record stored for a
//! package marks it done; later files and later runs skip it.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use hcpp_core::{AnnotationRecord, ERROR_MARKER, GroundTruth, ReferenceLists, Verdict, fields};
use hcpp_ml::metrics::{accuracy, binary_prf};
use hcpp_store::{Collection, DocumentStore, Filter};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{AiError, LlmError};
use crate::ollama::LanguageModel;
use crate::prompt::{self, PromptStyle};

#[derive(Debug, Clone)]
pub struct AnnotateConfig {
    /// Root holding one sub-directory of decompiled Java per package.
    pub source_root: PathBuf,
    /// Directory of `<package>.txt` manifest excerpts, for the manifest style.
    pub manifest_dir: Option<PathBuf>,
    pub style: PromptStyle,
    pub collection: String,
}

/// One Java file and the package it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub package: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnnotateStats {
    pub files: usize,
    pub annotated: usize,
    pub already_annotated: usize,
    pub excluded: usize,
    pub failed_calls: usize,
    pub undetermined: usize,
    pub unknown_truth: usize,
    /// Units left unprocessed because their manifest excerpt could not be read.
    pub missing_manifest: usize,
    /// Java files that could not be read as UTF-8 text.
    pub unreadable: usize,
}

/// All `*.java` files under `root`, sorted by path.
pub fn discover_units(root: &Path) -> Result<Vec<WorkUnit>, AiError> {
    let mut files = Vec::new();
    collect_java(root, &mut files)?;
    files.sort();
    Ok(files
        .into_iter()
        .filter_map(|path| {
            let package = path
                .strip_prefix(root)
                .ok()?
                .components()
                .next()?
                .as_os_str()
                .to_str()?
                .to_string();
            Some(WorkUnit { package, path })
        })
        .collect())
}

fn collect_java(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), AiError> {
    for entry in std::fs::read_dir(dir).map_err(AiError::io(dir))? {
        let path = entry.map_err(AiError::io(dir))?.path();
        if path.is_dir() {
            collect_java(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "java") {
            out.push(path);
        }
    }
    Ok(())
}

/// Response text persisted when the model call fails.
pub fn error_response(err: &LlmError) -> String {
    match err {
        LlmError::Server { status, body } => format!("{ERROR_MARKER} {status}: {body}"),
        other => format!("{ERROR_MARKER} {other}"),
    }
}

async fn build_prompt(unit: &WorkUnit, code: &str, config: &AnnotateConfig) -> Result<String, AiError> {
    match (config.style, &config.manifest_dir) {
        (PromptStyle::Manifest, Some(dir)) => {
            let path = dir.join(format!("{}.txt", unit.package));
            let manifest = tokio::fs::read_to_string(&path)
                .await
                .map_err(AiError::io(&path))?;
            Ok(prompt::with_manifest(code, &manifest))
        }
        _ => Ok(prompt::few_shot(code)),
    }
}

/// Classify every unannotated package and persist one record per package.
///
/// Model failures are stored as `[ERROR] ...` responses and never abort the
/// batch. Those records also count as done on later runs. Unreadable source
/// files and missing manifests are logged and skipped without a record.
pub async fn run_annotation(
    store: &dyn DocumentStore,
    llm: &dyn LanguageModel,
    refs: &ReferenceLists,
    config: &AnnotateConfig,
) -> Result<AnnotateStats, AiError> {
    let records: Collection<'_, AnnotationRecord> = Collection::new(store, &config.collection);
    let units = discover_units(&config.source_root)?;
    let mut stats = AnnotateStats {
        files: units.len(),
        ..Default::default()
    };
    info!(
        files = units.len(),
        root = %config.source_root.display(),
        collection = %config.collection,
        model = llm.model_name(),
        "starting code annotation"
    );

    for (idx, unit) in units.iter().enumerate() {
        let n = idx + 1;
        if refs.is_excluded(&unit.package) {
            info!(n, package = %unit.package, "skip non-interaction app");
            stats.excluded += 1;
            continue;
        }
        if records.exists(&Filter::eq(fields::PACKAGE, unit.package.as_str()))? {
            info!(n, package = %unit.package, "already annotated");
            stats.already_annotated += 1;
            continue;
        }

        info!(n, path = %unit.path.display(), "analyzing");
        let code = match tokio::fs::read_to_string(&unit.path).await {
            Ok(code) => code,
            Err(e) => {
                error!(package = %unit.package, path = %unit.path.display(), error = %e, "cannot read source file");
                stats.unreadable += 1;
                continue;
            }
        };
        let prompt = match build_prompt(unit, &code, config).await {
            Ok(p) => p,
            Err(e) => {
                warn!(package = %unit.package, error = %e, "cannot read manifest excerpt");
                stats.missing_manifest += 1;
                continue;
            }
        };

        let response = match llm.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                error!(package = %unit.package, error = %e, "model call failed");
                stats.failed_calls += 1;
                error_response(&e)
            }
        };

        let truth = refs.ground_truth(&unit.package);
        if truth == GroundTruth::Unknown {
            warn!(package = %unit.package, "package not on either reference list");
            stats.unknown_truth += 1;
        }
        let record = AnnotationRecord::new(
            unit.package.as_str(),
            response,
            truth,
            llm.model_name(),
            Utc::now().to_rfc3339(),
        );
        if record.verdict == Verdict::Undetermined {
            stats.undetermined += 1;
        }
        records.insert(&record)?;
        stats.annotated += 1;
    }

    info!(
        annotated = stats.annotated,
        already = stats.already_annotated,
        excluded = stats.excluded,
        failed = stats.failed_calls,
        unreadable = stats.unreadable,
        "code annotation finished"
    );
    Ok(stats)
}

/// Binary scores of stored predictions against ground truth (positive = 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Evaluation {
    pub scored: usize,
    pub unknown_truth: usize,
    pub undetermined: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Score every record with a known ground truth. Undetermined predictions
/// count as the opposite of the truth.
pub fn evaluate(store: &dyn DocumentStore, collection: &str) -> Result<Evaluation, AiError> {
    let records: Collection<'_, AnnotationRecord> = Collection::new(store, collection);
    let mut truth = Vec::new();
    let mut pred = Vec::new();
    let mut eval = Evaluation::default();
    for (_, record) in records.find(&Filter::All)? {
        match record.scored_pair() {
            Some((t, p)) => {
                truth.push(t);
                pred.push(p);
                if record.verdict == Verdict::Undetermined {
                    eval.undetermined += 1;
                }
            }
            None => eval.unknown_truth += 1,
        }
    }
    eval.scored = truth.len();
    eval.accuracy = accuracy(&truth, &pred);
    (eval.precision, eval.recall, eval.f1) = binary_prf(&truth, &pred, 1);
    info!(
        collection,
        apps = eval.scored,
        accuracy = eval.accuracy,
        f1 = eval.f1,
        "evaluated annotations"
    );
    Ok(eval)
}

#[derive(Serialize)]
struct ExportRow<'a> {
    packagename: &'a str,
    groundtruth: i8,
    prediction: i8,
    reasoning: &'a str,
}

/// Write `packagename,groundtruth,prediction,reasoning` rows in store order.
pub fn export_csv<W: Write>(store: &dyn DocumentStore, collection: &str, out: W) -> Result<usize, AiError> {
    let records: Collection<'_, AnnotationRecord> = Collection::new(store, collection);
    let mut writer = csv::Writer::from_writer(out);
    let mut rows = 0;
    for (_, r) in records.find(&Filter::All)? {
        writer.serialize(ExportRow {
            packagename: &r.package,
            groundtruth: r.binary_gt,
            prediction: r.binary_label,
            reasoning: &r.response,
        })?;
        rows += 1;
    }
    writer.flush().map_err(|e| AiError::Csv(e.into()))?;
    Ok(rows)
}
