//! Strand CLI - runs a simulated request through the coroutine core.
//!
//! # Configuration
//!
//! Sources, highest priority first:
//!
//! 1. CLI arguments
//! 2. Environment variables (`STRAND_*`)
//! 3. Project config (`.strand/config.toml` under `--project`)
//! 4. Global config (`~/.strand/config.toml`)
//! 5. Default values
//!
//! # Environment Variables
//!
//! - `STRAND_DEBUG`: debug logging (`true`/`false`)
//! - `STRAND_MAX_ALLOWED_SUBCOROUTINES`: live sub-coroutines per root
//! - `STRAND_MAX_SUBCOROUTINE_EXEC_TIME`: join timeout in seconds
//! - `STRAND_ENABLE_COMPLETE_BACKTRACE`: capture creation-site backtraces

mod demo;

use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use strand_runtime::{ConfigLoader, CoroutineManager, StrandConfig};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Strand - coroutine orchestration demo
#[derive(Parser, Debug)]
#[command(name = "strand")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long)]
    project: Option<PathBuf>,

    /// Number of shard queries to fan out
    #[arg(long, default_value_t = 4)]
    fan_out: usize,

    /// Per-shard delay step in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 20)]
    delay_ms: u64,

    /// Make the shard at INDEX fail
    #[arg(long, value_name = "INDEX")]
    fail_at: Option<usize>,

    /// Request path bound into the root coroutine
    #[arg(default_value = "/reports/daily")]
    request: String,
}

impl Args {
    fn resolve_config(&self) -> Result<StrandConfig> {
        let project_root = match &self.project {
            Some(path) => path.clone(),
            None => std::env::current_dir().unwrap_or_else(|e| {
                eprintln!("warning: cannot read current directory ({e}), using '.'");
                PathBuf::from(".")
            }),
        };

        let mut config = ConfigLoader::new()
            .with_project_root(&project_root)
            .load()
            .context("Config error")?;

        if self.debug {
            config.debug = true;
        }
        Ok(config)
    }
}

fn init_tracing(debug: bool, verbose: bool) {
    let filter = if debug {
        EnvFilter::new("debug,tokio=warn")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;
    init_tracing(config.debug, args.verbose);

    info!(
        max_allowed_subcoroutines = config.coroutine.max_allowed_subcoroutines,
        exec_time_secs = config.coroutine.max_subcoroutine_exec_time,
        backtraces = config.coroutine.enable_complete_backtrace,
        "Configuration loaded"
    );

    let manager = CoroutineManager::new(config.coroutine);
    let options = demo::DemoOptions {
        fan_out: args.fan_out,
        delay: Duration::from_millis(args.delay_ms),
        fail_at: args.fail_at,
    };

    let report = demo::run(&manager, &args.request, options)
        .await
        .with_context(|| format!("request {} failed", args.request))?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(trace) = report.rows.iter().find_map(|row| row.backtrace.as_deref()) {
        println!("\nFull backtrace of the first shard:\n{trace}");
    }
    Ok(())
}
