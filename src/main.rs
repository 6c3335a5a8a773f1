//! Treatment Predictor - Main Entry Point
//!
//! Trains model bundles from the survey CSV, scores single records or
//! JSON-lines batches, and prints model insights.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use treatment_predictor::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    metrics::{MetricsReporter, ScoringMetrics},
    scoring::score_lines,
    InferenceService, SurveyRecord, TrainingPipeline,
};

#[derive(Parser)]
#[command(name = "treatment-predictor", version, about = "Mental health treatment prediction")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model bundle from the survey CSV
    Train {
        #[arg(long)]
        dataset: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score one JSON record (`-` reads stdin)
    Predict {
        #[arg(long)]
        record: PathBuf,
    },
    /// Score a JSON-lines file of records
    Score {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print evaluation metrics, top features and dataset summary
    Insights,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_found = cli.config.exists();
    let config = if config_found {
        AppConfig::load_from_path(&cli.config)?
    } else {
        AppConfig::default()
    };

    init_logging(&config.logging)?;
    if config_found {
        info!(path = %cli.config.display(), "Configuration loaded successfully");
    } else {
        warn!(path = %cli.config.display(), "Configuration file not found, using defaults");
    }

    match cli.command {
        Command::Train { dataset, output } => train(&config, dataset, output),
        Command::Predict { record } => predict(&config, &record),
        Command::Score { input, output } => score(config, &input, output.as_deref()).await,
        Command::Insights => insights(&config),
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("treatment_predictor={}", logging.level).parse()?);

    // stdout carries outcomes, logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

fn train(config: &AppConfig, dataset: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let dataset = dataset.unwrap_or_else(|| PathBuf::from(&config.paths.dataset));
    let mut pipeline = TrainingPipeline::new(config);
    if let Some(output) = output {
        pipeline = pipeline.with_output(output);
    }

    info!(
        dataset = %dataset.display(),
        n_estimators = config.model.n_estimators,
        max_depth = config.model.max_depth,
        learning_rate = config.model.learning_rate,
        "Starting training run"
    );
    let bundle = pipeline.train(&dataset)?;

    let metrics = &bundle.metrics;
    info!(
        "ROC-AUC {:.3} | F1 (weighted) {:.3} | CV AUC {:.3} ± {:.3}",
        metrics.roc_auc, metrics.f1_weighted, metrics.cv_auc_mean, metrics.cv_auc_std
    );
    let [[tn, fp], [fn_, tp]] = metrics.confusion_matrix.rows();
    info!(
        "Confusion matrix: tn={} fp={} fn={} tp={} | accuracy {:.3}",
        tn,
        fp,
        fn_,
        tp,
        metrics.confusion_matrix.accuracy()
    );
    for (rank, item) in bundle.feature_importances.iter().take(10).enumerate() {
        info!("  {:>2}. {:<40} {:.4}", rank + 1, item.feature, item.importance);
    }
    info!(
        bundle_id = %bundle.bundle_id,
        output = %pipeline.output().display(),
        "Model bundle written"
    );
    Ok(())
}

fn predict(config: &AppConfig, record_path: &Path) -> Result<()> {
    let service = InferenceService::load(&config.paths.bundle, config.inference.clone())?;

    let mut text = String::new();
    if record_path == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read record from stdin")?;
    } else {
        text = std::fs::read_to_string(record_path)
            .with_context(|| format!("Failed to read {}", record_path.display()))?;
    }
    let record: SurveyRecord =
        serde_json::from_str(&text).context("Record must be a JSON object")?;

    let outcome = service.predict(&record);
    debug!(
        predicted_class = ?outcome.predicted_class,
        p_yes = outcome.probability.yes,
        confidence = ?outcome.confidence,
        "Record scored"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn insights(config: &AppConfig) -> Result<()> {
    let service = InferenceService::load(&config.paths.bundle, config.inference.clone())?;
    println!("{}", serde_json::to_string_pretty(&service.insights())?);
    Ok(())
}

async fn score(config: AppConfig, input: &Path, output: Option<&Path>) -> Result<()> {
    let service = Arc::new(InferenceService::load(
        &config.paths.bundle,
        config.inference.clone(),
    )?);
    let metrics = Arc::new(ScoringMetrics::new());

    let reader = BufReader::new(
        std::fs::File::open(input).with_context(|| format!("Failed to open {}", input.display()))?,
    );
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::BufWriter::new(std::io::stdout())),
    };

    let num_workers = config.pipeline.workers.max(1);
    info!(
        input = %input.display(),
        workers = num_workers,
        "Starting batch scoring with {} parallel workers",
        num_workers
    );

    // Periodic summary for long batches
    let reporter = tokio::spawn(MetricsReporter::new(metrics.clone(), 30).start());

    let processed = score_lines(service, metrics.clone(), reader.lines(), sink, num_workers).await;
    reporter.abort();
    let processed = processed?;

    info!(processed, "Batch scoring finished");
    metrics.print_summary();
    Ok(())
}
