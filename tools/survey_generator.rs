//! Synthetic Survey Generator
//!
//! Writes a seeded synthetic survey CSV with the OSMI column layout, for
//! running the training pipeline without the real dataset.

use anyhow::Context;
use clap::Parser;
use std::fs::{self, File};
use std::path::PathBuf;
use tracing::info;
use treatment_predictor::synthetic::{write_csv, SurveyGenerator};

#[derive(Parser)]
#[command(name = "survey-generator", about = "Generate a synthetic OSMI survey CSV")]
struct Args {
    /// Number of respondents
    #[arg(long, default_value_t = 1259)]
    rows: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output CSV path
    #[arg(long, default_value = "data/survey.csv")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(rows = args.rows, seed = args.seed, "Generating synthetic survey");

    let rows = SurveyGenerator::new(args.seed).generate(args.rows);
    let positives = rows.iter().filter(|r| r.treatment).count();

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    write_csv(file, &rows)?;

    info!(
        "Completed! Wrote {} respondents ({} seeking treatment, {} not) to {}",
        rows.len(),
        positives,
        rows.len() - positives,
        args.output.display()
    );
    Ok(())
}
