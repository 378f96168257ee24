//! Experiment configs for the multi-adapter LoRA trainer.
//!
//! One YAML file is produced per (dataset, concurrency level) pair. Each file
//! declares a single dataset and a fixed number of adapter/task pairs whose
//! hyperparameters are drawn from configured pools.
//!
//! # Example
//!
//! ```rust
//! use mlora_prep::config::ExperimentSettings;
//! use mlora_prep::experiment::ConfigGenerator;
//! use mlora_prep::normalize::DatasetKind;
//!
//! # fn main() -> mlora_prep::Result<()> {
//! let settings = ExperimentSettings { tasks_per_file: 3, ..Default::default() };
//! let mut generator = ConfigGenerator::seeded(settings, "/work/adapters", 42);
//!
//! let config = generator.generate(DatasetKind::Mrpc, "/work/data/mrpc_train_subset_128.json", 4)?;
//! config.validate()?;
//! assert_eq!(config.tasks.len(), 3);
//! assert_eq!(config.tasks[0].adapter, "lora_mrpc_0");
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{ExperimentSettings, PrepConfig};
use crate::error::{PrepError, Result};
use crate::normalize::DatasetKind;

/// One `(r, alpha, lr)` LoRA hyperparameter tuple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoraParams {
    /// Rank.
    pub r: usize,
    /// Scaling numerator.
    pub alpha: usize,
    /// Learning rate.
    pub lr: f64,
}

impl LoraParams {
    /// Create a tuple.
    #[must_use]
    pub const fn new(r: usize, alpha: usize, lr: f64) -> Self {
        Self { r, alpha, lr }
    }
}

/// A complete trainer config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Scheduler settings.
    pub dispatcher: Dispatcher,
    /// Training datasets.
    pub datasets: Vec<DatasetEntry>,
    /// LoRA adapters.
    pub adapters: Vec<AdapterEntry>,
    /// Training tasks, each binding one adapter to one dataset.
    pub tasks: Vec<TaskEntry>,
}

/// Dispatcher section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatcher {
    /// Dispatcher implementation.
    pub name: String,
    /// Number of tasks trained concurrently.
    pub concurrency_num: usize,
}

/// Dataset section entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Name referenced by tasks.
    pub name: String,
    /// Record file.
    pub data: String,
    /// Prompt template file.
    pub prompt: String,
    /// Prompt template kind.
    pub prompt_type: String,
    /// Preprocessing applied by the trainer.
    pub preprocess: String,
}

/// Projection layers an adapter attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct TargetModules {
    /// Query projection.
    pub q_proj: bool,
    /// Key projection.
    pub k_proj: bool,
    /// Value projection.
    pub v_proj: bool,
    /// Output projection.
    pub o_proj: bool,
    /// MLP gate projection.
    pub gate_proj: bool,
    /// MLP up projection.
    pub up_proj: bool,
    /// MLP down projection.
    pub down_proj: bool,
}

impl TargetModules {
    /// Every projection enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            q_proj: true,
            k_proj: true,
            v_proj: true,
            o_proj: true,
            gate_proj: true,
            up_proj: true,
            down_proj: true,
        }
    }
}

/// Adapter section entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterEntry {
    /// Name referenced by tasks.
    pub name: String,
    /// Adapter kind, always `lora`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Directory the trained adapter is saved to.
    pub path: String,
    /// Optimizer name.
    pub optimizer: String,
    /// Dropout probability.
    pub dropout: f64,
    /// Layers the adapter attaches to.
    pub target_modules: TargetModules,
    /// Rank.
    pub r: usize,
    /// Scaling numerator.
    pub alpha: usize,
    /// Learning rate.
    pub lr: f64,
}

/// Task section entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Task kind, always `train`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Task name.
    pub name: String,
    /// Adapter trained by this task.
    pub adapter: String,
    /// Dataset consumed by this task.
    pub dataset: String,
    /// Batch size.
    pub batch_size: usize,
    /// Micro-batch size.
    pub mini_batch_size: usize,
    /// Epochs.
    pub num_epochs: usize,
    /// Token cutoff per sample.
    pub cutoff_len: usize,
    /// Checkpoint interval.
    pub save_step: usize,
}

impl ExperimentConfig {
    /// Load an experiment config from YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write the config as YAML, creating parent directories.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Check that names are unique and every task reference resolves.
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.concurrency_num == 0 {
            return Err(PrepError::Experiment(
                "dispatcher.concurrency_num must be > 0".into(),
            ));
        }

        let datasets = unique_names("dataset", self.datasets.iter().map(|d| d.name.as_str()))?;
        let adapters = unique_names("adapter", self.adapters.iter().map(|a| a.name.as_str()))?;
        unique_names("task", self.tasks.iter().map(|t| t.name.as_str()))?;

        for task in &self.tasks {
            if !adapters.contains(task.adapter.as_str()) {
                return Err(PrepError::Experiment(format!(
                    "task {} references unknown adapter {}",
                    task.name, task.adapter
                )));
            }
            if !datasets.contains(task.dataset.as_str()) {
                return Err(PrepError::Experiment(format!(
                    "task {} references unknown dataset {}",
                    task.name, task.dataset
                )));
            }
        }

        Ok(())
    }
}

fn unique_names<'a>(
    what: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(PrepError::Experiment(format!("duplicate {what} name {name}")));
        }
    }
    Ok(seen)
}

/// Draws experiment configs from the configured hyperparameter pools.
#[derive(Debug)]
pub struct ConfigGenerator<R = StdRng> {
    settings: ExperimentSettings,
    adapter_dir: PathBuf,
    rng: R,
}

impl ConfigGenerator<StdRng> {
    /// Generator with a fixed seed; identical seeds yield identical configs.
    pub fn seeded(settings: ExperimentSettings, adapter_dir: impl Into<PathBuf>, seed: u64) -> Self {
        Self::with_rng(settings, adapter_dir, StdRng::seed_from_u64(seed))
    }

    /// Generator seeded from OS entropy.
    pub fn from_entropy(settings: ExperimentSettings, adapter_dir: impl Into<PathBuf>) -> Self {
        Self::with_rng(settings, adapter_dir, StdRng::from_entropy())
    }
}

impl<R: Rng> ConfigGenerator<R> {
    /// Generator drawing from `rng`.
    pub fn with_rng(settings: ExperimentSettings, adapter_dir: impl Into<PathBuf>, rng: R) -> Self {
        Self {
            settings,
            adapter_dir: adapter_dir.into(),
            rng,
        }
    }

    /// Build the config for one dataset at one concurrency level.
    pub fn generate(
        &mut self,
        dataset: DatasetKind,
        data_path: &str,
        concurrency: usize,
    ) -> Result<ExperimentConfig> {
        let name = dataset.name();
        let dataset_name = format!("{name}_data");
        let s = &self.settings;

        let mut adapters = Vec::with_capacity(s.tasks_per_file);
        let mut tasks = Vec::with_capacity(s.tasks_per_file);

        for i in 0..s.tasks_per_file {
            let adapter_name = format!("lora_{name}_{i}");
            let params = *s
                .lora_pool
                .choose(&mut self.rng)
                .ok_or_else(|| PrepError::Config("lora_pool is empty".into()))?;
            let batch_size = *s
                .batch_size_pool
                .choose(&mut self.rng)
                .ok_or_else(|| PrepError::Config("batch_size_pool is empty".into()))?;

            let path = self
                .adapter_dir
                .join(format!("{name}_pool"))
                .join(&adapter_name);

            adapters.push(AdapterEntry {
                name: adapter_name.clone(),
                kind: "lora".into(),
                path: path.to_string_lossy().into_owned(),
                optimizer: "adamw".into(),
                dropout: s.dropout,
                target_modules: TargetModules::all(),
                r: params.r,
                alpha: params.alpha,
                lr: params.lr,
            });

            tasks.push(TaskEntry {
                kind: "train".into(),
                name: format!("task_{name}_{i}"),
                adapter: adapter_name,
                dataset: dataset_name.clone(),
                batch_size,
                mini_batch_size: batch_size,
                num_epochs: s.num_epochs,
                cutoff_len: s.cutoff_len,
                save_step: s.save_step,
            });
        }

        Ok(ExperimentConfig {
            dispatcher: Dispatcher {
                name: "default".into(),
                concurrency_num: concurrency,
            },
            datasets: vec![DatasetEntry {
                name: dataset_name,
                data: data_path.to_string(),
                prompt: s.prompt.clone(),
                prompt_type: "instruction".into(),
                preprocess: "shuffle".into(),
            }],
            adapters,
            tasks,
        })
    }
}

/// A config file written by [`generate_all`].
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    /// Dataset of the file.
    pub dataset: DatasetKind,
    /// Concurrency level of the file.
    pub concurrency: usize,
    /// Written path.
    pub path: PathBuf,
}

/// Generate and write every (dataset, concurrency) config.
///
/// `seed` overrides `experiments.seed`. Without any seed, sampling is not
/// reproducible.
pub fn generate_all(config: &PrepConfig, seed: Option<u64>) -> Result<Vec<GeneratedFile>> {
    let settings = &config.experiments;
    let output_dir = config.resolve(&settings.output_dir);
    let adapter_dir = config.resolve(&settings.adapter_dir);

    tracing::info!("Generating configs into {}", output_dir.display());
    tracing::info!("Data dir: {}", config.data_path().display());
    tracing::info!("Adapter dir: {}", adapter_dir.display());

    let mut generator = match seed.or(settings.seed) {
        Some(seed) => {
            tracing::debug!("Sampling hyperparameters with seed {seed}");
            ConfigGenerator::seeded(settings.clone(), adapter_dir, seed)
        }
        None => ConfigGenerator::from_entropy(settings.clone(), adapter_dir),
    };

    let mut written = Vec::new();
    for &dataset in &settings.datasets {
        let data_path = config.experiment_data_path(dataset);
        if !data_path.exists() {
            tracing::warn!("Data file not found: {}", data_path.display());
        }
        let data = data_path.to_string_lossy();

        for &concurrency in &settings.concurrency_levels {
            let experiment = generator.generate(dataset, &data, concurrency)?;
            experiment.validate()?;

            let path = output_dir
                .join(dataset.name())
                .join(format!("c{concurrency}.yaml"));
            experiment.to_file(&path)?;
            written.push(GeneratedFile {
                dataset,
                concurrency,
                path,
            });
        }

        if let Some(max) = settings.concurrency_levels.iter().max() {
            tracing::info!("Generated c1..c{max} for {dataset}");
        }
    }

    Ok(written)
}
