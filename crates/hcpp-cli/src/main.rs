mod display;
mod sweep;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use hcpp_ai::annotate::{evaluate, export_csv};
use hcpp_ai::policy::{ocr_permissions, ocr_policies, segment_policies};
use hcpp_ai::{
    AnnotateConfig, DisclosureConfig, OllamaApi, OllamaClient, OllamaConfig, PolicyIngestConfig,
    PromptStyle, TesseractOcr, analyze_disclosure, disclosure_summary, run_annotation,
};
use hcpp_core::ReferenceLists;
use hcpp_core::segment::DEFAULT_MAX_WORDS;
use hcpp_ml::{AggregationMode, FeatureSpec, SEGMENT_WIDTH, SweepConfig};
use hcpp_store::{DocumentStore, DuckStore, MemoryStore};
use tracing_subscriber::EnvFilter;

use crate::sweep::{SweepRequest, run_sweep_pipeline, write_report};

const MEMORY_STORE: &str = ":memory:";

#[derive(Parser)]
#[command(name = "hcpp", version, about = "Health Connect privacy-policy study pipeline")]
struct Cli {
    /// Document store: a DuckDB file path, or ":memory:" for a throwaway store
    #[arg(long, global = true, env = "HCPP_STORE", default_value = "hcpp.duckdb")]
    store: String,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Grid-search classifier families over segment embeddings
    Sweep(SweepArgs),
    #[command(flatten)]
    Store(StoreCommand),
}

/// Subcommands that read or write the document store.
#[derive(Subcommand)]
enum StoreCommand {
    /// Ask the language model to classify each app's privacy-policy activity code
    AnnotateCode(AnnotateArgs),
    /// Score stored code annotations against their ground truth
    EvaluateCode {
        #[arg(long, default_value = DEFAULT_CODE_COLLECTION)]
        collection: String,
    },
    /// Export stored code annotations as CSV
    ExportCode {
        #[arg(long, default_value = DEFAULT_CODE_COLLECTION)]
        collection: String,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Split plain-text policies into word-bounded segments
    SegmentPolicies(PolicyArgs),
    /// OCR policy screenshots into segments
    OcrPolicies {
        #[command(flatten)]
        policy: PolicyArgs,
        #[command(flatten)]
        ocr: OcrArgs,
    },
    /// OCR permission dialogs and record the requested capabilities
    OcrPermissions {
        #[command(flatten)]
        policy: PolicyArgs,
        #[command(flatten)]
        ocr: OcrArgs,
    },
    /// Check each policy for capability-specific rationales
    AnalyzeDisclosure {
        #[arg(long, default_value = DEFAULT_POLICY_COLLECTION)]
        collection: String,
        #[command(flatten)]
        ollama: OllamaArgs,
    },
    /// Count stored disclosure labels
    DisclosureSummary {
        #[arg(long, default_value = DEFAULT_POLICY_COLLECTION)]
        collection: String,
    },
    /// Run segment-policies, ocr-policies, ocr-permissions and analyze-disclosure in order
    Rq3 {
        #[command(flatten)]
        policy: PolicyArgs,
        #[command(flatten)]
        ocr: OcrArgs,
        #[command(flatten)]
        ollama: OllamaArgs,
    },
}

const DEFAULT_CODE_COLLECTION: &str = "codellama_java_fewshot";
const DEFAULT_POLICY_COLLECTION: &str = "RQ3";
const DEFAULT_CODE_MODEL: &str = "codellama:34b";
const DEFAULT_POLICY_MODEL: &str = "gemma3";

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Averaged,
    Padded,
    Both,
}

impl ModeArg {
    fn modes(self) -> Vec<AggregationMode> {
        match self {
            Self::Averaged => vec![AggregationMode::Averaged],
            Self::Padded => vec![AggregationMode::Padded],
            Self::Both => vec![AggregationMode::Averaged, AggregationMode::Padded],
        }
    }
}

#[derive(Args)]
struct SweepArgs {
    /// JSONL file with one {package, class, <field>} record per app
    #[arg(long)]
    features: PathBuf,
    /// Name of the embedding field
    #[arg(long, default_value = "embedding")]
    field: String,
    /// Width of one segment embedding
    #[arg(long, default_value_t = SEGMENT_WIDTH)]
    width: usize,
    /// lr, rf, svm or all
    #[arg(long, default_value = "all")]
    model: String,
    #[arg(long, value_enum, default_value = "both")]
    mode: ModeArg,
    #[arg(long, default_value_t = 5)]
    folds: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Also write the results as JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct AnnotateArgs {
    /// Decompiled sources, one directory per package
    #[arg(long)]
    source_root: PathBuf,
    /// Directory of <package>.txt manifest excerpts (manifest style only)
    #[arg(long)]
    manifest_dir: Option<PathBuf>,
    /// few-shot or manifest
    #[arg(long, default_value = "few-shot")]
    style: PromptStyle,
    /// CSV of packages known to implement the activity
    #[arg(long)]
    positive: Option<PathBuf>,
    /// CSV of packages known not to implement it
    #[arg(long)]
    negative: Option<PathBuf>,
    /// CSV of packages to skip
    #[arg(long)]
    excluded: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_CODE_COLLECTION)]
    collection: String,
    #[command(flatten)]
    ollama: OllamaArgs,
}

#[derive(Args)]
struct PolicyArgs {
    /// Study data root holding pp_txt/, pp_png/ and permission_png/
    #[arg(long, default_value = ".")]
    data_root: PathBuf,
    #[arg(long, default_value = DEFAULT_POLICY_COLLECTION)]
    collection: String,
    /// Maximum words per policy segment
    #[arg(long, default_value_t = DEFAULT_MAX_WORDS)]
    max_words: usize,
}

impl PolicyArgs {
    fn config(&self) -> PolicyIngestConfig {
        PolicyIngestConfig {
            max_words: self.max_words,
            ..PolicyIngestConfig::under(&self.data_root, self.collection.clone())
        }
    }
}

#[derive(Args)]
struct OcrArgs {
    /// OCR engine executable
    #[arg(long, default_value = "tesseract")]
    tesseract: String,
    #[arg(long, default_value = "eng")]
    lang: String,
}

impl OcrArgs {
    fn engine(&self) -> TesseractOcr {
        TesseractOcr {
            program: self.tesseract.clone(),
            lang: self.lang.clone(),
        }
    }
}

#[derive(Args)]
struct OllamaArgs {
    #[arg(long, env = "HCPP_OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,
    /// Model tag (defaults depend on the subcommand)
    #[arg(long, env = "HCPP_MODEL")]
    model: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 600)]
    timeout: u64,
}

impl OllamaArgs {
    fn client(&self, default_model: &str, api: OllamaApi) -> anyhow::Result<OllamaClient> {
        let config = OllamaConfig {
            base_url: self.ollama_url.clone(),
            model: self.model.clone().unwrap_or_else(|| default_model.to_string()),
            api,
            timeout: Duration::from_secs(self.timeout),
        };
        OllamaClient::new(config).context("building Ollama client")
    }
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file: File = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
    Ok(())
}

fn open_store(spec: &str) -> anyhow::Result<Box<dyn DocumentStore>> {
    if spec == MEMORY_STORE {
        return Ok(Box::new(MemoryStore::new()));
    }
    let store = DuckStore::open_persistent(Path::new(spec))
        .with_context(|| format!("opening document store {spec}"))?;
    Ok(Box::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;
    tracing::info!("hcpp v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Sweep(args) => cmd_sweep(&args),
        Command::Store(command) => {
            let store = open_store(&cli.store)?;
            run_store_command(store.as_ref(), command).await
        }
    }
}

async fn run_store_command(store: &dyn DocumentStore, command: StoreCommand) -> anyhow::Result<()> {
    match command {
        StoreCommand::AnnotateCode(args) => cmd_annotate(store, &args).await,
        StoreCommand::EvaluateCode { collection } => {
            let eval = evaluate(store, &collection).context("evaluating annotations")?;
            print!("{}", display::evaluation(&collection, &eval));
            Ok(())
        }
        StoreCommand::ExportCode { collection, output } => cmd_export(store, &collection, output.as_deref()),
        StoreCommand::SegmentPolicies(policy) => {
            let stats = segment_policies(store, &policy.config()).context("segmenting policies")?;
            print!("{}", display::ingest_stats("Segment policies", &stats));
            Ok(())
        }
        StoreCommand::OcrPolicies { policy, ocr } => {
            let stats = ocr_policies(store, &ocr.engine(), &policy.config())
                .await
                .context("transcribing policy screenshots")?;
            print!("{}", display::ingest_stats("OCR policies", &stats));
            Ok(())
        }
        StoreCommand::OcrPermissions { policy, ocr } => {
            let stats = ocr_permissions(store, &ocr.engine(), &policy.config())
                .await
                .context("transcribing permission screenshots")?;
            print!("{}", display::ingest_stats("OCR permissions", &stats));
            Ok(())
        }
        StoreCommand::AnalyzeDisclosure { collection, ollama } => {
            cmd_analyze(store, &collection, &ollama).await
        }
        StoreCommand::DisclosureSummary { collection } => {
            let tally = disclosure_summary(store, &collection).context("reading disclosure labels")?;
            print!("{}", display::disclosure_tally("Disclosure summary", &tally));
            Ok(())
        }
        StoreCommand::Rq3 { policy, ocr, ollama } => {
            let config = policy.config();
            let engine = ocr.engine();

            eprintln!("Step 1/4: segmenting text policies...");
            let stats = segment_policies(store, &config).context("segmenting policies")?;
            print!("{}", display::ingest_stats("Segment policies", &stats));

            eprintln!("Step 2/4: transcribing policy screenshots...");
            let stats = ocr_policies(store, &engine, &config)
                .await
                .context("transcribing policy screenshots")?;
            print!("{}", display::ingest_stats("OCR policies", &stats));

            eprintln!("Step 3/4: transcribing permission screenshots...");
            let stats = ocr_permissions(store, &engine, &config)
                .await
                .context("transcribing permission screenshots")?;
            print!("{}", display::ingest_stats("OCR permissions", &stats));

            eprintln!("Step 4/4: analyzing disclosure...");
            cmd_analyze(store, &config.collection, &ollama).await
        }
    }
}

fn cmd_sweep(args: &SweepArgs) -> anyhow::Result<()> {
    let req = SweepRequest {
        features: &args.features,
        spec: FeatureSpec {
            field: args.field.clone(),
            width: args.width,
        },
        family: &args.model,
        modes: args.mode.modes(),
        config: SweepConfig {
            n_splits: args.folds,
            seed: args.seed,
        },
    };
    let report = run_sweep_pipeline(&req)?;
    print!("{}", display::sweep_report(&report));
    if let Some(path) = &args.output {
        write_report(&report, path)?;
        eprintln!("  Wrote {}", path.display());
    }
    Ok(())
}

async fn cmd_annotate(store: &dyn DocumentStore, args: &AnnotateArgs) -> anyhow::Result<()> {
    let refs = ReferenceLists::load(
        args.positive.as_deref(),
        args.negative.as_deref(),
        args.excluded.as_deref(),
    )
    .context("loading reference lists")?;
    let llm = args.ollama.client(DEFAULT_CODE_MODEL, OllamaApi::Generate)?;
    let config = AnnotateConfig {
        source_root: args.source_root.clone(),
        manifest_dir: args.manifest_dir.clone(),
        style: args.style,
        collection: args.collection.clone(),
    };

    let stats = run_annotation(store, &llm, &refs, &config)
        .await
        .context("annotating code")?;
    print!("{}", display::annotate_stats(&stats));

    let eval = evaluate(store, &config.collection).context("evaluating annotations")?;
    print!("{}", display::evaluation(&config.collection, &eval));
    Ok(())
}

fn cmd_export(store: &dyn DocumentStore, collection: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let rows = match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            export_csv(store, collection, file)
        }
        None => export_csv(store, collection, io::stdout().lock()),
    }
    .context("exporting annotations")?;
    eprintln!("  Exported {rows} annotations from {collection}");
    Ok(())
}

async fn cmd_analyze(store: &dyn DocumentStore, collection: &str, ollama: &OllamaArgs) -> anyhow::Result<()> {
    let llm = ollama.client(DEFAULT_POLICY_MODEL, OllamaApi::Chat)?;
    let config = DisclosureConfig {
        collection: collection.to_string(),
    };
    let run = analyze_disclosure(store, &llm, &config)
        .await
        .context("analyzing disclosure")?;
    print!("{}", display::disclosure_run(&run));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sweep_defaults() {
        let cli = Cli::try_parse_from(["hcpp", "sweep", "--features", "f.jsonl"]).unwrap();
        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep");
        };
        assert_eq!(args.width, 384);
        assert_eq!(args.folds, 5);
        assert_eq!(args.seed, 42);
        assert_eq!(args.model, "all");
        assert_eq!(args.mode.modes().len(), 2);
    }

    #[test]
    fn annotate_parses_style_and_model() {
        let cli = Cli::try_parse_from([
            "hcpp",
            "--store",
            ":memory:",
            "annotate-code",
            "--source-root",
            "src",
            "--style",
            "manifest",
            "--model",
            "llama3",
        ])
        .unwrap();
        assert_eq!(cli.store, ":memory:");
        let Command::Store(StoreCommand::AnnotateCode(args)) = cli.command else {
            panic!("expected annotate-code");
        };
        assert_eq!(args.style, PromptStyle::Manifest);
        assert_eq!(args.collection, DEFAULT_CODE_COLLECTION);
        let client = args.ollama.client(DEFAULT_CODE_MODEL, OllamaApi::Generate).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn policy_args_build_ingest_config() {
        let cli = Cli::try_parse_from(["hcpp", "segment-policies", "--data-root", "/data", "--max-words", "100"])
            .unwrap();
        let Command::Store(StoreCommand::SegmentPolicies(policy)) = cli.command else {
            panic!("expected segment-policies");
        };
        let config = policy.config();
        assert_eq!(config.collection, "RQ3");
        assert_eq!(config.max_words, 100);
        assert_eq!(config.txt_dir, Path::new("/data").join("pp_txt"));
    }

    #[tokio::test]
    async fn memory_store_starts_empty() {
        let store = open_store(MEMORY_STORE).unwrap();
        let tally = disclosure_summary(store.as_ref(), "RQ3").unwrap();
        assert_eq!(tally.total(), 0);
    }

    #[tokio::test]
    async fn store_subcommands_dispatch_without_sweep() {
        let cli = Cli::try_parse_from(["hcpp", "--store", ":memory:", "disclosure-summary"]).unwrap();
        let Command::Store(command) = cli.command else {
            panic!("disclosure-summary should be a store command");
        };
        let store = open_store(&cli.store).unwrap();
        run_store_command(store.as_ref(), command).await.unwrap();
    }
}
