//! parafind CLI: mine parallelizable prompts from chat corpora.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use parafind_core::{
    HeuristicSignals, NovelCategoryRegistry, RecordMeta, ResponseExtractor, ValidationStats,
    Validator,
};
use parafind_runtime::{
    build_classifier, new_query_id, BatchRunner, JsonFileStore, JsonlCorpus, ProviderRegistry,
    ResultStore, RunContext, RunSummary, RuntimeConfig, ShutdownHandle, ShutdownSignal,
    StorePaths,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Classify chat prompts as parallelizable or serial
#[derive(Parser)]
#[command(name = "parafind")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for programmatic use
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a corpus, resuming where the last run stopped
    Run {
        /// JSON Lines corpus, one {"conversation": [...]} per line
        #[arg(short, long)]
        corpus: PathBuf,

        /// Dataset name the output prefix is derived from (e.g. lmsys/lmsys-chat-1m)
        #[arg(short, long)]
        dataset: Option<String>,

        /// Explicit output prefix
        #[arg(short, long, conflicts_with = "dataset")]
        prefix: Option<String>,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// File holding the classifier system instruction
        #[arg(long)]
        system_prompt: Option<PathBuf>,

        /// Directory for the row store, stats and novel categories
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Concurrent workers per batch
        #[arg(long)]
        workers: Option<usize>,

        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the effective configuration as YAML and exit
        #[arg(long)]
        print_config: bool,
    },

    /// Extract and validate one model response offline
    Validate {
        /// The prompt the response classifies
        #[arg(short, long)]
        prompt: String,

        /// File holding the model response (or - for stdin)
        #[arg(short, long)]
        response: Option<String>,

        /// Corpus index to stamp on the record
        #[arg(long, default_value = "0")]
        index: u64,
    },

    /// Show persisted validation stats and novel categories
    Stats {
        /// Output prefix of the run
        #[arg(short, long)]
        prefix: String,

        /// Directory holding the run's files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            corpus,
            dataset,
            prefix,
            config,
            system_prompt,
            output_dir,
            workers,
            batch_size,
            print_config,
        } => {
            let overrides = RunOverrides {
                dataset,
                prefix,
                system_prompt,
                output_dir,
                workers,
                batch_size,
            };
            execute_run(cli.format, &corpus, config.as_deref(), overrides, print_config).await
        }

        Commands::Validate {
            prompt,
            response,
            index,
        } => execute_validate(cli.format, prompt, response, index),

        Commands::Stats { prefix, output_dir } => execute_stats(cli.format, &prefix, &output_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// run
// ============================================================================

struct RunOverrides {
    dataset: Option<String>,
    prefix: Option<String>,
    system_prompt: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    workers: Option<usize>,
    batch_size: Option<usize>,
}

impl RunOverrides {
    fn apply(self, config: &mut RuntimeConfig) {
        if let Some(dataset) = self.dataset {
            config.output.dataset = Some(dataset);
            config.output.prefix = None;
        }
        if let Some(prefix) = self.prefix {
            config.output.prefix = Some(prefix);
        }
        if let Some(path) = self.system_prompt {
            config.system_instruction = Some(path);
        }
        if let Some(dir) = self.output_dir {
            config.output.dir = dir;
        }
        if let Some(workers) = self.workers {
            config.batch.workers = workers;
        }
        if let Some(size) = self.batch_size {
            config.batch.size = size;
        }
    }
}

async fn execute_run(
    format: OutputFormat,
    corpus_path: &Path,
    config_path: Option<&Path>,
    overrides: RunOverrides,
    print_config: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;

    if print_config {
        let mut shown = config.clone();
        if let Some(key) = shown.provider.options.get_mut("api_key") {
            *key = serde_json::Value::String("[REDACTED]".to_string());
        }
        print!("{}", serde_yaml::to_string(&shown).context("serializing config")?);
        return Ok(());
    }

    let prefix = config.resolve_prefix().context("no output prefix")?;

    let registry = ProviderRegistry::with_defaults();
    let classifier = build_classifier(&config, &registry).context("building classifier")?;
    if !classifier.is_ready().await {
        bail!("provider '{}' is not ready", classifier.provider_name());
    }
    let context = RunContext::init(&config.output.dir, &prefix)
        .with_context(|| format!("opening stores in {}", config.output.dir.display()))?;
    let corpus = JsonlCorpus::open(corpus_path)
        .with_context(|| format!("loading corpus {}", corpus_path.display()))?;

    let (handle, signal) = ShutdownSignal::channel();
    tokio::spawn(forward_shutdown(handle));

    let mut runner = BatchRunner::new(
        Arc::new(corpus),
        Arc::new(classifier),
        Arc::new(context),
        config.batch.clone(),
    );
    let summary = runner.run(signal).await.context("run failed")?;

    output(format, &summary, print_summary)
}

/// Turn Ctrl+C or SIGTERM into a graceful shutdown request.
async fn forward_shutdown(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing current batch"),
        _ = terminate => info!("Received SIGTERM, finishing current batch"),
    }
    handle.shutdown();
}

fn print_summary(summary: &RunSummary) {
    println!("Run {}", summary.final_state);
    println!("  processed:      {}", summary.processed);
    println!("  parallelizable: {}", summary.parallelizable);
    println!("  skipped:        {}", summary.skipped);
    println!("  failed tasks:   {}", summary.failed);
    println!("  fallbacks:      {}", summary.fallbacks);
    println!("  resume at:      {}", summary.resume_position);

    if !summary.categories.is_empty() {
        println!("Known categories:");
        for (category, count) in &summary.categories {
            println!("  {:<28} {}", category, count);
        }
    }
    if !summary.novel_categories.is_empty() {
        println!("Novel categories:");
        for (category, count) in &summary.novel_categories {
            println!("  {:<28} {}", category, count);
        }
    }

    print_stats(&summary.validation);
    println!(
        "LLM usage: {} calls, {} cache hits, {} tokens, ~${:.4}",
        summary.usage.llm_calls,
        summary.usage.cache_hits,
        summary.usage.total_tokens,
        summary.usage.estimated_cost
    );
}

// ============================================================================
// validate
// ============================================================================

#[derive(Serialize)]
struct ValidateReport {
    record: parafind_core::ClassificationResult,
    violations: Vec<String>,
    signals: Option<HeuristicSignals>,
}

fn execute_validate(
    format: OutputFormat,
    prompt: String,
    response: Option<String>,
    index: u64,
) -> Result<()> {
    let response = read_response(response)?;
    if response.trim().is_empty() {
        bail!("response is empty");
    }

    let raw = ResponseExtractor::new().extract(&response, &prompt);
    let validation = Validator::new().validate(&raw, RecordMeta::new(index, new_query_id(), prompt));

    let report = ValidateReport {
        record: validation.result,
        violations: validation.violations.iter().map(ToString::to_string).collect(),
        signals: validation.signals,
    };

    output(format, &report, |report| {
        let record = &report.record;
        println!("Tier:           {}", record.validation_tier);
        println!("Parallelizable: {}", record.parallelizable);
        println!("Category:       {}", record.category.as_deref().unwrap_or("-"));
        if record.is_novel_category {
            println!(
                "Novel:          {}",
                record.category_description.as_deref().unwrap_or("(no description)")
            );
        }
        println!("Serial:         {}", record.serial);
        if let Some(template) = &record.template {
            println!("Template:       {}", template);
        }
        if let Some(data) = &record.data {
            println!("Data:           {} items", data.len());
        }
        if let Some(n) = &record.n {
            println!("N:              {}", n);
        }
        for violation in &report.violations {
            println!("Violation:      {}", violation);
        }
        if let Some(signals) = &report.signals {
            println!("Signals:        {}", signals.fired().join(", "));
        }
    })
}

/// Read the response from a file, or stdin for `None` / `-`.
fn read_response(arg: Option<String>) -> Result<String> {
    match arg {
        Some(path) if path != "-" => {
            fs::read_to_string(&path).with_context(|| format!("reading response {}", path))
        }
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("reading response from stdin")?;
            Ok(input)
        }
    }
}

// ============================================================================
// stats
// ============================================================================

#[derive(Serialize)]
struct StatsReport {
    prefix: String,
    stored_rows: usize,
    validation: ValidationStats,
    novel_categories: NovelCategoryRegistry,
}

fn execute_stats(format: OutputFormat, prefix: &str, dir: &Path) -> Result<()> {
    let paths = StorePaths::for_prefix(dir, prefix);
    if !paths.rows.exists() && !paths.stats.exists() {
        bail!("no run found for prefix '{}' in {}", prefix, dir.display());
    }

    let stored_rows = if paths.rows.exists() {
        ResultStore::open(&paths.rows)
            .and_then(|store| store.load_all())
            .with_context(|| format!("reading {}", paths.rows.display()))?
            .len()
    } else {
        0
    };

    let report = StatsReport {
        prefix: prefix.to_string(),
        stored_rows,
        validation: JsonFileStore::new(&paths.stats).load_or_default(),
        novel_categories: JsonFileStore::new(&paths.novel_categories).load_or_default(),
    };

    output(format, &report, |report| {
        println!("Prefix {}: {} stored rows", report.prefix, report.stored_rows);
        print_stats(&report.validation);
        if report.novel_categories.is_empty() {
            println!("No novel categories");
            return;
        }
        println!("Novel categories:");
        for (name, category) in report.novel_categories.iter() {
            println!("  {:<28} {:>6}  {}", name, category.count, category.description);
        }
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_stats(stats: &ValidationStats) {
    println!(
        "Validation: {} claimed, {} passed, {} failed ({:.1}% pass rate)",
        stats.total_classified_as_parallelizable,
        stats.passed_validation,
        stats.failed_validation,
        stats.pass_rate() * 100.0
    );
    for (category, passed) in &stats.categories_passed {
        let failed = stats.categories_failed.get(category).copied().unwrap_or(0);
        println!("  {:<28} passed {:>6}  failed {:>6}", category, passed, failed);
    }
    for (category, failed) in &stats.categories_failed {
        if !stats.categories_passed.contains_key(category) {
            println!("  {:<28} passed {:>6}  failed {:>6}", category, 0, failed);
        }
    }
}

/// Print as pretty JSON or through the text renderer.
fn output<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).context("serializing output")?);
        }
        OutputFormat::Text => text(value),
    }
    Ok(())
}
