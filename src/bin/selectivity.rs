//! Selectivity ratio analysis from a JSON config
//!
//! Usage: `selectivity <config.json> [taxon_id ...]`
//!
//! Without taxon ids every taxon in the abundance table is scored. Results
//! are written to `output_dir` when the config sets one.

use anyhow::{bail, Result};
use env_selectivity::{AnalysisConfig, SelectivityScorer};
use std::env;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                // Default log level: info for our crate, warn for others
                .unwrap_or_else(|_| "env_selectivity=info,selectivity=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("Usage: {} <config.json> [taxon_id ...]", args[0]);
    }

    let config = AnalysisConfig::load(Path::new(&args[1]))?;
    let start = Instant::now();
    let scorer = SelectivityScorer::from_config(config)?;

    let taxa: Vec<String> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        scorer.taxa().to_vec()
    };
    tracing::info!("Scoring {} taxa (seed {})", taxa.len(), scorer.seed());

    let results = scorer.score_taxa_parallel(&taxa);

    let mut failed = 0;
    for (taxon, result) in &results {
        match result {
            Ok(result) => {
                let significant = result.significant_ranges();
                let strongest = result
                    .strongest()
                    .map(|row| format!("{:+.3} at {}", row.sel_ratio, row.x))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "{:<20} positions={:<3} strongest={:<18} significant={:?}",
                    taxon, result.n_positions, strongest, significant
                );
            }
            Err(e) => {
                failed += 1;
                tracing::error!("Taxon {} failed: {:#}", taxon, e);
            }
        }
    }

    tracing::info!(
        "Finished {} taxa ({} failed) in {:.2?}",
        results.len(),
        failed,
        start.elapsed()
    );
    if failed == results.len() && !results.is_empty() {
        bail!("All {} taxa failed", failed);
    }
    Ok(())
}
