use std::{env, path::Path, time::Instant};

use anyhow::{Context, Result};
use folio::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs the demo portfolio (or a JSON config given as first argument) and
/// writes every table to `demos/reports/portfolio`.
fn main() -> Result<()> {
    init_tracing();

    let config = match env::args().nth(1) {
        Some(path) => PipelineConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config from '{path}'"))?,
        None => PipelineConfig::demo()?,
    };

    let run_start = Instant::now();
    let run = Pipeline::new(config).run().context("Analysis run failed")?;
    let run_time = run_start.elapsed();

    print_summary(&run);

    let out = Path::new("demos/reports/portfolio");
    let written = run.export_csv(out)?;
    info!(files = written.len(), dir = %out.display(), "Reports written");

    println!("\n--- Timings ---");
    println!("Analysis run: {run_time:?}");

    Ok(())
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn print_summary(run: &AnalysisRun) {
    println!("\n--- Summary ---");
    for row in run.summary.rows() {
        println!(
            "{:<10} total {:>8.2}%  vol {:>6.2}%  max dd {:>7.2}% on {}",
            row.label.as_str(),
            row.total_return * 100.0,
            row.annualized_volatility * 100.0,
            row.max_drawdown * 100.0,
            row.max_drawdown_date,
        );
    }

    println!("\n--- Portfolio Risk ---");
    println!(
        "daily variance {:.3e}, daily volatility {:.4}%",
        run.risk.variance,
        run.risk.volatility * 100.0
    );

    println!("\n--- Yearly Performance ---");
    for row in run.yearly.rows() {
        println!(
            "{:<10} {}  {:>8.2}%  ({} .. {})",
            row.label.as_str(),
            row.year,
            row.performance * 100.0,
            row.first_date,
            row.last_date,
        );
    }

    if let Some(ratio) = run.comparison.outperformance_ratio() {
        println!("\nPortfolio ahead of benchmark on {:.1}% of days", ratio * 100.0);
    }
}
