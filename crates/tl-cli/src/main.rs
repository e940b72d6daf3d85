use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tl")]
#[command(about = "Trade ledger: broker orders to FIFO positions and P&L", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize raw broker order files and append new executions to the log
    Ingest {
        /// Execution log (JSONL); created if missing
        #[arg(long)]
        log: String,

        /// Layered config paths in merge order (base -> account -> ...)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Fail when the config carries keys the engine does not read
        #[arg(long, default_value_t = false)]
        strict_config: bool,

        /// Raw order files: a JSON array, `{"results": [...]}`, or JSON Lines
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Recompute every position from the log and replace the export directory
    Reconcile {
        #[arg(long)]
        log: String,

        #[arg(long = "config")]
        config_paths: Vec<String>,

        #[arg(long, default_value_t = false)]
        strict_config: bool,

        /// Export directory (positions/report/daily/summary/manifest)
        #[arg(long)]
        out: String,

        /// Valuation instant, RFC 3339 (defaults to now)
        #[arg(long)]
        as_of: Option<String>,

        /// JSON object of contract key -> mark price for open positions
        #[arg(long)]
        marks: Option<String>,
    },

    /// Print realized P&L per reporting day
    Daily {
        #[arg(long)]
        log: String,

        #[arg(long = "config")]
        config_paths: Vec<String>,

        #[arg(long, default_value_t = false)]
        strict_config: bool,

        #[arg(long)]
        as_of: Option<String>,

        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Also list the positions closed on this day (YYYY-MM-DD)
        #[arg(long)]
        on: Option<String>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,

        #[arg(long, default_value_t = false)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    // Load .env.local if present (dev convenience; RUST_LOG etc.).
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Ingest {
            log,
            config_paths,
            strict_config,
            inputs,
        } => {
            let cfg = commands::load_config(&config_paths, strict_config)?;
            commands::ingest::run(&log, &cfg, &inputs)
        }
        Commands::Reconcile {
            log,
            config_paths,
            strict_config,
            out,
            as_of,
            marks,
        } => {
            let cfg = commands::load_config(&config_paths, strict_config)?;
            let as_of = commands::parse_as_of(as_of.as_deref())?;
            commands::reconcile::run(&log, &cfg, &out, as_of, marks.as_deref())
        }
        Commands::Daily {
            log,
            config_paths,
            strict_config,
            as_of,
            from,
            to,
            on,
        } => {
            let cfg = commands::load_config(&config_paths, strict_config)?;
            let as_of = commands::parse_as_of(as_of.as_deref())?;
            let range = commands::parse_range(from.as_deref(), to.as_deref())?;
            let on = on.as_deref().map(|d| commands::parse_day(d, "--on")).transpose()?;
            commands::reconcile::daily(&log, &cfg, as_of, range, on)
        }
        Commands::ConfigHash { paths, strict } => {
            let cfg = commands::load_config(&paths, strict)?;
            println!("config_hash={}", cfg.loaded.config_hash);
            println!("unused_keys={}", cfg.unused.unused_leaf_pointers.len());
            println!("{}", cfg.loaded.canonical_json);
            Ok(())
        }
    }
}

/// Logs go to stderr; stdout carries only `key=value` results.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
