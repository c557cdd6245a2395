use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use insightmill_core::{
    BatchPlan, BatchSummary, HttpBackend, ItemOutcome, MillConfig, ModelProvider, PROGRESS_FILE,
    ProgressState, TaskKind, combine_results, run_batch, verify_translations,
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", secs / 60.0, secs % 60.0)
    }
}

/// CLI wrapper for ModelProvider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Claude,
    Gemini25,
    Gemini3,
}

impl From<CliProvider> for ModelProvider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Claude => ModelProvider::Claude,
            CliProvider::Gemini25 => ModelProvider::Gemini25,
            CliProvider::Gemini3 => ModelProvider::Gemini3,
        }
    }
}

#[derive(Args)]
struct CommonArgs {
    /// Directory of source transcripts (<id>.txt)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory (result files and progress.json)
    #[arg(short, long)]
    output: PathBuf,

    /// AI provider
    #[arg(short, long, default_value = "claude")]
    provider: CliProvider,

    /// Override the provider's default model name
    #[arg(long)]
    model: Option<String>,

    /// Starting offset into the pending list
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Number of items to process in this invocation
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Force re-processing even if already completed
    #[arg(short, long)]
    force: bool,
}

#[derive(Args)]
struct TranslateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Total parallel workers sharing the progress file
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// This worker's slot index (0-based, processes ids where i % workers == slot)
    #[arg(long, default_value_t = 0)]
    slot: usize,

    /// Explicit id list file (one id per line) instead of directory discovery
    #[arg(long)]
    list: Option<PathBuf>,

    /// Concurrent in-flight chunk calls (1 = sequential with delay)
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Maximum chunk size in characters
    #[arg(long, default_value_t = 12_000)]
    chunk_size: usize,

    /// Seconds to sleep between chunk calls in sequential mode
    #[arg(long, default_value_t = 2)]
    delay: u64,

    /// Keep going when a chunk fails, leaving a gap in the translation
    #[arg(long)]
    lenient: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Extract structured methodology data from transcripts
    Extract(CommonArgs),
    /// Translate transcripts from English to Chinese in resumable batches
    Translate(TranslateArgs),
    /// Re-run the items currently recorded as failed
    Retry(TranslateArgs),
    /// Show completed/failed/pending tallies from the progress file
    Status {
        /// Output directory holding progress.json
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Audit translated documents against the source transcripts
    Verify {
        /// Directory of source transcripts (<id>.txt)
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory holding the per-episode documents
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Parser)]
#[command(name = "insightmill")]
#[command(about = "Extract methodologies from podcast transcripts and translate them with AI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn build_config(common: &CommonArgs) -> MillConfig {
    let provider: ModelProvider = common.provider.clone().into();
    let mut cfg = match MillConfig::from_env(provider) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    if let Some(model) = &common.model {
        cfg.model = model.clone();
    }
    cfg.force = common.force;
    cfg
}

fn print_outcome(position: usize, total: usize, id: &str, outcome: &ItemOutcome) {
    let prefix = format!("[{}/{}]", position + 1, total);
    match outcome {
        ItemOutcome::Completed => {
            println!("{} {} {}", style(prefix).dim(), style("✓").green().bold(), id);
        }
        ItemOutcome::Failed(reason) => {
            println!(
                "{} {} {} {}",
                style(prefix).dim(),
                style("✗").red().bold(),
                id,
                style(reason).dim()
            );
        }
        ItemOutcome::NoSourceText => {
            println!(
                "{} {} {} {}",
                style(prefix).dim(),
                style("⏭").yellow(),
                id,
                style("(no source text)").dim()
            );
        }
        ItemOutcome::SkippedCompleted => {
            println!(
                "{} {} {} {}",
                style(prefix).dim(),
                style("⏭").yellow(),
                id,
                style("(already completed)").dim()
            );
        }
    }
}

fn print_summary(summary: &BatchSummary, elapsed: Duration) {
    println!("\n{}", style("─".repeat(60)).dim());
    println!(
        "{} {} completed, {} failed, {} skipped {}",
        style("Batch complete:").bold(),
        style(summary.completed).green(),
        style(summary.failed).red(),
        style(summary.skipped).yellow(),
        style(format!("[{}]", format_duration(elapsed))).dim()
    );
}

fn print_next_command(subcommand: &str, common: &CommonArgs, next_start: usize) {
    println!(
        "\n{} insightmill {} --input {} --output {} --start {} --count {}",
        style("Next batch:").dim(),
        subcommand,
        common.input.display(),
        common.output.display(),
        next_start,
        common.count
    );
}

async fn run_translate(args: &TranslateArgs, retry_failed: bool) -> Result<()> {
    let mut cfg = build_config(&args.common);
    cfg.chunk_size = args.chunk_size;
    cfg.call_delay = Duration::from_secs(args.delay);
    cfg.max_concurrency = args.concurrency.max(1);
    cfg.strict_reassembly = !args.lenient;

    let mut plan = BatchPlan::new(
        TaskKind::Translate,
        args.common.input.clone(),
        args.common.output.clone(),
    );
    plan.start = args.common.start;
    plan.count = args.common.count;
    plan.workers = args.workers.max(1);
    plan.slot = args.slot;
    plan.id_list = args.list.clone();
    plan.retry_failed = retry_failed;
    plan.concurrent = args.concurrency > 1;

    if plan.slot >= plan.workers {
        eprintln!(
            "{} slot {} out of range for {} workers",
            style("Error:").red().bold(),
            plan.slot,
            plan.workers
        );
        std::process::exit(1);
    }

    println!(
        "\n{}  {}\n",
        style("insightmill").cyan().bold(),
        style("Transcript Translator").dim()
    );
    println!(
        "{} {} | slot {}/{} | concurrency {}",
        style("Model:").dim(),
        style(&cfg.model).yellow(),
        plan.slot,
        plan.workers,
        cfg.max_concurrency
    );
    println!("{}", style("─".repeat(60)).dim());

    let backend = Arc::new(HttpBackend::new(cfg.clone())?);
    let start = Instant::now();
    let summary = run_batch(backend, &cfg, &plan, print_outcome).await?;

    print_summary(&summary, start.elapsed());
    // The window is carved out of the full id list, so the next start is
    // where this window ended, regardless of how many items still needed
    // work inside it.
    let window_end = args
        .common
        .start
        .saturating_add(args.common.count)
        .min(summary.universe);
    if window_end < summary.universe {
        let subcommand = if retry_failed { "retry" } else { "translate" };
        print_next_command(subcommand, &args.common, window_end);
    } else {
        println!("\n{}", style("Nothing left to translate.").green());
    }
    Ok(())
}

async fn run_extract(common: &CommonArgs) -> Result<()> {
    let cfg = build_config(common);

    let mut plan = BatchPlan::new(TaskKind::Extract, common.input.clone(), common.output.clone());
    plan.start = common.start;
    plan.count = common.count;

    println!(
        "\n{}  {}\n",
        style("insightmill").cyan().bold(),
        style("Methodology Extractor").dim()
    );
    println!("{} {}", style("Model:").dim(), style(&cfg.model).yellow());
    println!("{}", style("─".repeat(60)).dim());

    let backend = Arc::new(HttpBackend::new(cfg.clone())?);
    let start = Instant::now();
    let summary = run_batch(backend, &cfg, &plan, print_outcome).await?;

    let spinner = create_spinner("Updating combined data file...");
    let combined_path = common.output.join("sample_data.json");
    let episodes = combine_results(&common.output.join("json"), &combined_path).await?;
    spinner.finish_with_message(format!(
        "{} Combined: {} episodes in {}",
        style("✓").green().bold(),
        episodes,
        style(combined_path.display()).cyan()
    ));

    print_summary(&summary, start.elapsed());
    let window_end = common
        .start
        .saturating_add(common.count)
        .min(summary.universe);
    if window_end < summary.universe {
        print_next_command("extract", common, window_end);
    } else {
        println!("\n{}", style("All transcripts processed!").green());
    }
    Ok(())
}

async fn run_status(output: &PathBuf) -> Result<()> {
    let progress = ProgressState::load(&output.join(PROGRESS_FILE)).await?;
    println!(
        "\n{} {} completed, {} failed, {} skipped\n",
        style("Progress:").bold(),
        style(progress.completed.len()).green(),
        style(progress.failed.len()).red(),
        style(progress.skipped.len()).yellow()
    );
    if !progress.failed.is_empty() {
        println!("{}", style("Failed items:").dim());
        for id in &progress.failed {
            println!("  {}", id);
        }
    }
    Ok(())
}

async fn run_verify(input: &PathBuf, output: &PathBuf) -> Result<()> {
    let report = verify_translations(input, output).await?;
    println!(
        "\n{} {} of {} transcripts translated\n",
        style("Coverage:").bold(),
        style(report.translated).green(),
        report.total
    );
    for (label, ids) in [
        ("Untranslated documents:", &report.untranslated),
        ("Missing documents:", &report.missing),
        ("Marked completed but untranslated:", &report.inconsistent),
    ] {
        if ids.is_empty() {
            continue;
        }
        println!("{}", style(label).yellow());
        for id in ids {
            println!("  {}", id);
        }
    }
    if report.translated == report.total {
        println!("{}", style("All transcripts translated.").green());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Extract(common) => run_extract(common).await,
        Command::Translate(args) => run_translate(args, false).await,
        Command::Retry(args) => run_translate(args, true).await,
        Command::Status { output } => run_status(output).await,
        Command::Verify { input, output } => run_verify(input, output).await,
    }
}
