//! CLI entry point for mlora-prep.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mlora_prep::eval;
use mlora_prep::experiment::{self, ExperimentConfig};
use mlora_prep::model::{self, LlamaGenerator};
use mlora_prep::normalize::{self, DatasetKind, Gsm8kStyle};
use mlora_prep::{raw, record, stats, subset, PrepConfig, Result};

#[derive(Parser)]
#[command(name = "mlora-prep")]
#[command(about = "Dataset preparation, experiment configs and evaluation for mLoRA runs")]
#[command(version)]
struct Cli {
    /// Path to a prep configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize raw dataset exports into training records
    Normalize {
        /// Only normalize this dataset
        #[arg(long, value_enum)]
        dataset: Option<DatasetKind>,
        /// Write GSM8K as plain question/answer records
        #[arg(long)]
        plain: bool,
    },
    /// Slice the leading records of each training file
    Subset {
        /// Number of records to keep
        #[arg(long)]
        size: Option<usize>,
    },
    /// Generate trainer configs for every dataset and concurrency level
    GenConfigs {
        /// Seed for hyperparameter sampling
        #[arg(long)]
        seed: Option<u64>,
        /// Output directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check a generated trainer config
    Validate {
        /// Path to the trainer config
        file: PathBuf,
    },
    /// Report token-length statistics of a record file
    TokenStats {
        /// Tokenizer file or model directory
        #[arg(long)]
        tokenizer: Option<PathBuf>,
        /// Record file
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Evaluate GSM8K accuracy of a base model plus LoRA adapter
    Eval {
        /// Base model directory or hub id
        #[arg(long)]
        base_model: Option<PathBuf>,
        /// Adapter directory
        #[arg(long, conflicts_with = "no_adapter")]
        adapter: Option<PathBuf>,
        /// Evaluate the base model alone
        #[arg(long)]
        no_adapter: bool,
        /// Only evaluate the first N questions
        #[arg(long)]
        limit: Option<usize>,
        /// Maximum generated tokens per question
        #[arg(long)]
        max_new_tokens: Option<usize>,
        /// Write a JSON summary here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Write the default prep configuration
    Init {
        /// Output path for config file
        #[arg(default_value = "prep.yaml")]
        output: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<PrepConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration: {}", path.display());
            PrepConfig::from_file(path)
        }
        None => Ok(PrepConfig::default()),
    }
}

fn main() -> Result<()> {
    // Initialize logging; info unless RUST_LOG says otherwise
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output } => {
            PrepConfig::default().to_file(&output)?;
            println!("✓ Configuration written to: {output}");
        }
        Commands::Validate { file } => {
            tracing::info!("Validating experiment config: {}", file.display());
            let experiment = ExperimentConfig::from_file(&file)?;
            experiment.validate()?;
            println!("✓ Experiment config is valid");
            println!("  Concurrency: {}", experiment.dispatcher.concurrency_num);
            println!("  Datasets: {}", experiment.datasets.len());
            println!("  Adapters: {}", experiment.adapters.len());
            println!("  Tasks: {}", experiment.tasks.len());
        }
        Commands::Normalize { dataset, plain } => {
            let mut config = load_config(cli.config.as_ref())?;
            if plain {
                config.normalize.gsm8k_style = Gsm8kStyle::Plain;
            }
            config.validate()?;

            let kinds = dataset.map_or_else(|| config.normalize.datasets.clone(), |d| vec![d]);
            for outcome in normalize::normalize_all(&config, &kinds)? {
                println!(
                    "✓ {}: saved {} items to {}",
                    outcome.kind,
                    outcome.records,
                    outcome.output.display()
                );
            }
        }
        Commands::Subset { size } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(size) = size {
                config.subset.size = size;
            }
            config.validate()?;

            for outcome in subset::slice_all(&config) {
                match outcome.result {
                    Ok(report) => println!(
                        "✓ {}: sliced {} to {} samples -> {}",
                        outcome.file,
                        report.original,
                        report.kept,
                        report.output.display()
                    ),
                    Err(e) => println!("✗ {}: {e}", outcome.file),
                }
            }
        }
        Commands::GenConfigs { seed, output } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(output) = output {
                config.experiments.output_dir = output;
            }
            config.validate()?;

            let written = experiment::generate_all(&config, seed)?;
            println!(
                "✓ Generated {} configs in: {}",
                written.len(),
                config.resolve(&config.experiments.output_dir).display()
            );
        }
        Commands::TokenStats { tokenizer, data } => {
            let config = load_config(cli.config.as_ref())?;
            let tokenizer_path = tokenizer.unwrap_or_else(|| config.stats.tokenizer.clone());
            let data_path = config.resolve(data.unwrap_or_else(|| config.stats.data.clone()));

            tracing::info!("Loading tokenizer from {}", tokenizer_path.display());
            let tokenizer = model::load_tokenizer(&model::resolve_model_path(&tokenizer_path)?)?;
            tracing::info!("Loading data from {}", data_path.display());
            let records = record::read_json_array(&data_path)?;

            let token_stats = stats::compute(&tokenizer, &records, true)?;
            println!("{}", "=".repeat(30));
            println!("{}", token_stats.report());
            println!("{}", "=".repeat(30));
        }
        Commands::Eval {
            base_model,
            adapter,
            no_adapter,
            limit,
            max_new_tokens,
            report,
        } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(limit) = limit {
                config.eval.sample_size = Some(limit);
            }
            if let Some(max_new_tokens) = max_new_tokens {
                config.eval.max_new_tokens = max_new_tokens;
            }
            config.validate()?;
            let settings = &config.eval;

            let split_path = config.resolve(&settings.test_split);
            tracing::info!("Loading test split: {}", split_path.display());
            let mut examples = raw::load_split(&split_path)?;
            if let Some(n) = settings.sample_size {
                tracing::info!("Evaluating only the first {n} questions");
                examples.truncate(n);
            }

            let base_model = base_model.unwrap_or_else(|| settings.base_model.clone());
            let adapter = if no_adapter {
                None
            } else {
                adapter
                    .or_else(|| settings.adapter.clone())
                    .map(|p| config.resolve(p))
            };

            let mut generator = LlamaGenerator::load(settings, &base_model, adapter.as_deref())?;
            let summary =
                eval::evaluate(&mut generator, &examples, settings.max_new_tokens, true)?;

            println!("{}", summary.report());
            if let Some(path) = report.or_else(|| settings.report.clone()) {
                let path = config.resolve(path);
                summary.to_file(&path)?;
                println!("✓ Summary written to: {}", path.display());
            }
        }
    }

    Ok(())
}
