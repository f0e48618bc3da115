use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pgs")]
#[command(about = "Portfolio grid search: generate, backtest in batches, consolidate, rank", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> local overrides ...)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    /// Fail instead of warning when the config has keys this command does not read
    #[arg(long, global = true, default_value_t = false)]
    strict_config: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the allocation grid and write the grid file
    GenerateGrid {
        /// Preset grid (coarse | fine | treasury | random); overrides grid.preset
        #[arg(long)]
        preset: Option<String>,

        /// Portfolios to draw for the random preset
        #[arg(long)]
        count: Option<usize>,

        /// RNG seed for the random preset
        #[arg(long)]
        seed: Option<u64>,

        /// Output path; defaults to paths.grid_file
        #[arg(long)]
        out: Option<String>,
    },

    /// Partition the grid into batches, create the manifest and upload files
    Plan,

    /// Run pending batches against the backtest service
    RunBatches {
        /// Start from a fresh manifest instead of resuming
        #[arg(long, default_value_t = false)]
        no_resume: bool,

        /// Also re-submit batches the service rejected
        #[arg(long, default_value_t = false)]
        retry_rejected: bool,

        /// First batch index to run (1-based, inclusive)
        #[arg(long)]
        start_batch: Option<usize>,

        /// Last batch index to run (inclusive)
        #[arg(long)]
        end_batch: Option<usize>,
    },

    /// Print manifest status counts and failed batches
    Status,

    /// Parse completed batch documents into the consolidated tables
    Consolidate,

    /// Rank consolidated portfolios and write rank_report.json
    Rank {
        /// Metric for the single-objective ranking; defaults to rank.sharpe_metric
        #[arg(long)]
        metric: Option<String>,

        /// Rank ascending instead of descending
        #[arg(long, default_value_t = false)]
        ascending: bool,

        /// Overrides rank.top_n
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Verify the batch journal hash chain
    JournalVerify {
        /// Journal path; defaults to <paths.work_dir>/batch_journal.jsonl
        #[arg(long)]
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    let cfg = commands::ConfigArgs {
        paths: cli.config_paths,
        strict: cli.strict_config,
    };

    match cli.cmd {
        Commands::GenerateGrid {
            preset,
            count,
            seed,
            out,
        } => commands::grid::generate_grid(
            &cfg,
            commands::grid::PresetArgs {
                name: preset,
                count,
                seed,
            },
            out,
        ),
        Commands::Plan => commands::grid::plan_batches(&cfg),
        Commands::RunBatches {
            no_resume,
            retry_rejected,
            start_batch,
            end_batch,
        } => {
            commands::run::run_batches(
                cfg,
                commands::run::RunArgs {
                    no_resume,
                    retry_rejected,
                    start_batch,
                    end_batch,
                },
            )
            .await
        }
        Commands::Status => commands::run::status(&cfg),
        Commands::Consolidate => commands::results::consolidate(&cfg),
        Commands::Rank {
            metric,
            ascending,
            top_n,
        } => commands::results::rank(&cfg, metric, ascending, top_n),
        Commands::ConfigHash { paths } => {
            let loaded = pgs_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(())
        }
        Commands::JournalVerify { path } => commands::run::journal_verify(&cfg, path),
    }
}

/// Logs go to stderr; stdout carries the `key=value` result lines.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
