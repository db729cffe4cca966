//! pdcr: Per-Decision Cressie-Read Off-Policy Evaluation
//!
//! Provides subcommands over a JSON trajectory log:
//!
//! - `estimate` -- Per-step point estimates
//! - `interval` -- Per-step confidence bounds
//! - `report`   -- Full evaluation report, optionally saved to disk
//! - `demo`     -- Run the built-in reference scenario

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pdcr::config::OpeConfig;
use pdcr::cressie_read::{Estimator, Interval};
use pdcr::evaluation::{Evaluation, EvaluationReport};
use pdcr::trajectory::{golden_scenario, TrajectoryLog};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// pdcr: Per-Decision Cressie-Read Off-Policy Evaluation
#[derive(Parser)]
#[command(name = "pdcr", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Lower bound on any single-step importance ratio.
    #[arg(long, global = true)]
    wmin: Option<f64>,

    /// Upper bound on any single-step importance ratio (unbounded if omitted).
    #[arg(long, global = true)]
    wmax: Option<f64>,

    /// Lower bound on any single-step reward.
    #[arg(long, global = true, allow_negative_numbers = true)]
    rmin: Option<f64>,

    /// Upper bound on any single-step reward.
    #[arg(long, global = true, allow_negative_numbers = true)]
    rmax: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print per-step point estimates of the expected reward.
    Estimate {
        /// Path to the trajectory log JSON file.
        log: PathBuf,
    },

    /// Print per-step confidence bounds.
    Interval {
        /// Path to the trajectory log JSON file.
        log: PathBuf,

        /// One-sided miscoverage probability (overrides the config).
        #[arg(long)]
        alpha: Option<f64>,
    },

    /// Compute estimates and bounds together.
    Report {
        /// Path to the trajectory log JSON file.
        log: PathBuf,

        /// One-sided miscoverage probability (overrides the config).
        #[arg(long)]
        alpha: Option<f64>,

        /// Path to save the report as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Evaluate the built-in reference scenario.
    Demo,
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load or create configuration, then apply flag overrides.
    let mut config = match &cli.config {
        Some(path) => OpeConfig::load_from_file(path)?,
        None => OpeConfig::default(),
    };
    if let Some(wmin) = cli.wmin {
        config.weights.wmin = wmin;
    }
    if let Some(wmax) = cli.wmax {
        config.weights.wmax = Some(wmax);
    }
    if let Some(rmin) = cli.rmin {
        config.rewards.rmin = rmin;
    }
    if let Some(rmax) = cli.rmax {
        config.rewards.rmax = rmax;
    }

    match cli.command {
        Commands::Estimate { log } => cmd_estimate(&config, &log),
        Commands::Interval { log, alpha } => {
            if let Some(alpha) = alpha {
                config.interval.alpha = alpha;
            }
            cmd_interval(&config, &log)
        }
        Commands::Report { log, alpha, output } => {
            if let Some(alpha) = alpha {
                config.interval.alpha = alpha;
            }
            cmd_report(&config, &log, output.as_deref())
        }
        Commands::Demo => cmd_demo(&config),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_estimate(config: &OpeConfig, log_path: &Path) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let log = TrajectoryLog::load_from_file(log_path)?;

    let mut estimator = Estimator::new(config.weights.wmin, config.weights.upper_bound())?;
    log.feed(&mut estimator)
        .context("Failed to ingest trajectory log")?;
    let estimates = estimator
        .get_estimate(config.rewards)
        .context("Failed to compute estimates")?;

    println!("Estimates: {}", log_path.display());
    for (step, v) in estimates.iter().enumerate() {
        println!("  step {step}: {v:.6}");
    }
    Ok(())
}

fn cmd_interval(config: &OpeConfig, log_path: &Path) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let log = TrajectoryLog::load_from_file(log_path)?;

    let mut interval = Interval::new(config.weights.wmin, config.weights.upper_bound())?;
    log.feed(&mut interval)
        .context("Failed to ingest trajectory log")?;
    let bounds = interval
        .get_interval(config.interval.alpha, config.rewards)
        .context("Failed to compute interval")?;

    println!(
        "Interval (alpha = {}): {}",
        config.interval.alpha,
        log_path.display()
    );
    for (step, (lo, hi)) in bounds.iter().enumerate() {
        println!("  step {step}: [{lo:.6}, {hi:.6}]");
    }
    Ok(())
}

fn cmd_report(config: &OpeConfig, log_path: &Path, output: Option<&Path>) -> Result<()> {
    let log = TrajectoryLog::load_from_file(log_path)?;
    let report = Evaluation::run(config, &log).context("Evaluation failed")?;

    print_report(&report);

    if let Some(output) = output {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        report.save_to_file(output)?;
    }
    Ok(())
}

fn cmd_demo(config: &OpeConfig) -> Result<()> {
    tracing::info!("Running reference scenario");
    let report = Evaluation::run(config, &golden_scenario()).context("Evaluation failed")?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    println!("Evaluation report");
    println!(
        "  Generated: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Trajectories: {}", report.trajectories);
    println!("  Total count: {}", report.total_count);
    println!("  Weight bounds: [{}, {}]", report.wmin, report.wmax);
    println!("  Reward range: [{}, {}]", report.rmin, report.rmax);
    println!("  Alpha (per step): {}", report.alpha);
    println!();

    for s in &report.steps {
        println!(
            "  step {}: estimate {:.6}  interval [{:.6}, {:.6}]",
            s.step, s.estimate, s.lower, s.upper
        );
    }

    let total = &report.cumulative;
    println!();
    println!(
        "  cumulative: estimate {:.6}  joint interval [{:.6}, {:.6}] \
         (alpha {} overall, {} per step)",
        total.estimate, total.lower, total.upper, total.alpha, total.step_alpha
    );
}
