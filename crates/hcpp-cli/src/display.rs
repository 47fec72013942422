//! Plain-text report rendering for the batch subcommands.
//!
//! Every report is a titled card of `label  value` rows, plus a table for
//! sweep results.

use std::fmt::Write as _;

use hcpp_ai::annotate::Evaluation;
use hcpp_ai::{AnnotateStats, DisclosureRun, IngestStats};
use hcpp_core::DisclosureTally;

use crate::sweep::SweepReport;

const LABEL_WIDTH: usize = 22;

// ── Card helpers ──

fn title(out: &mut String, text: &str) {
    let _ = writeln!(out, "=== {text} ===");
}

fn row(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {label:<LABEL_WIDTH$} {value}");
}

fn pct(count: usize, total: usize) -> String {
    if total == 0 {
        return "-".into();
    }
    format!("{count} ({:.1}%)", count as f64 / total as f64 * 100.0)
}

// ── Sweep ──

pub fn sweep_report(report: &SweepReport) -> String {
    let mut out = String::new();
    title(&mut out, "Model sweep");
    row(&mut out, "features", &report.features);
    row(&mut out, "records", report.records);
    row(&mut out, "folds", report.n_splits);
    row(&mut out, "seed", report.seed);
    row(&mut out, "elapsed", format!("{:.1}s", report.elapsed_secs));
    out.push('\n');

    let _ = writeln!(
        out,
        "  {:<20} {:<9} {:>8} {:>8} {:>8} {:>8} {:>8}  best params",
        "family", "mode", "cv-F1", "acc", "prec", "recall", "F1"
    );
    for r in &report.results {
        let _ = writeln!(
            out,
            "  {:<20} {:<9} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4}  {}",
            r.family,
            r.mode,
            r.cv_macro_f1,
            r.mean.accuracy,
            r.mean.precision,
            r.mean.recall,
            r.mean.f1,
            r.best_params
        );
        if r.failed > 0 {
            let _ = writeln!(out, "    ({} of {} combinations failed to fit)", r.failed, r.candidates);
        }
    }
    out
}

// ── Code annotation ──

pub fn annotate_stats(stats: &AnnotateStats) -> String {
    let mut out = String::new();
    title(&mut out, "Code annotation");
    row(&mut out, "java files", stats.files);
    row(&mut out, "annotated", stats.annotated);
    row(&mut out, "already annotated", stats.already_annotated);
    row(&mut out, "excluded", stats.excluded);
    row(&mut out, "failed calls", stats.failed_calls);
    row(&mut out, "undetermined", stats.undetermined);
    row(&mut out, "unknown ground truth", stats.unknown_truth);
    if stats.missing_manifest > 0 {
        row(&mut out, "missing manifest", stats.missing_manifest);
    }
    if stats.unreadable > 0 {
        row(&mut out, "unreadable files", stats.unreadable);
    }
    out
}

pub fn evaluation(collection: &str, eval: &Evaluation) -> String {
    let mut out = String::new();
    title(&mut out, &format!("Evaluation: {collection}"));
    row(&mut out, "scored", eval.scored);
    row(&mut out, "undetermined", pct(eval.undetermined, eval.scored));
    row(&mut out, "unknown ground truth", eval.unknown_truth);
    row(&mut out, "accuracy", format!("{:.4}", eval.accuracy));
    row(&mut out, "precision", format!("{:.4}", eval.precision));
    row(&mut out, "recall", format!("{:.4}", eval.recall));
    row(&mut out, "f1", format!("{:.4}", eval.f1));
    out
}

// ── Policy ingestion and disclosure ──

pub fn ingest_stats(step: &str, stats: &IngestStats) -> String {
    let mut out = String::new();
    title(&mut out, step);
    row(&mut out, "processed", stats.processed);
    row(&mut out, "skipped", stats.skipped);
    if stats.ocr_failures > 0 {
        row(&mut out, "OCR failures", stats.ocr_failures);
    }
    if stats.missing_documents > 0 {
        row(&mut out, "missing documents", stats.missing_documents);
    }
    out
}

pub fn disclosure_tally(heading: &str, tally: &DisclosureTally) -> String {
    let mut out = String::new();
    title(&mut out, heading);
    let total = tally.total();
    row(&mut out, "policies", total);
    row(&mut out, "comprehensive", pct(tally.comprehensive, total));
    row(&mut out, "partial", pct(tally.partial, total));
    row(&mut out, "non disclosure", pct(tally.non, total));
    out
}

pub fn disclosure_run(run: &DisclosureRun) -> String {
    let mut out = disclosure_tally("Disclosure analysis", &run.tally);
    row(&mut out, "already analyzed", run.skipped);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcpp_core::DisclosureLevel;

    #[test]
    fn tally_card_shows_percentages() {
        let tally: DisclosureTally = [
            DisclosureLevel::Comprehensive,
            DisclosureLevel::Partial,
            DisclosureLevel::Partial,
            DisclosureLevel::Non,
        ]
        .into_iter()
        .collect();
        let card = disclosure_tally("Disclosure summary", &tally);
        assert!(card.starts_with("=== Disclosure summary ===\n"));
        assert!(card.contains("policies               4\n"));
        assert!(card.contains("partial                2 (50.0%)\n"));
        assert!(card.contains("non disclosure         1 (25.0%)\n"));
    }

    #[test]
    fn empty_tally_has_no_percentages() {
        let card = disclosure_tally("Disclosure summary", &DisclosureTally::default());
        assert!(card.contains("comprehensive          -\n"));
    }

    #[test]
    fn ingest_card_hides_zero_failure_rows() {
        let card = ingest_stats(
            "OCR permissions",
            &IngestStats {
                processed: 3,
                skipped: 1,
                ocr_failures: 0,
                missing_documents: 2,
            },
        );
        assert!(card.contains("processed              3\n"));
        assert!(!card.contains("OCR failures"));
        assert!(card.contains("missing documents      2\n"));
    }
}
