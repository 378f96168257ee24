//! Configuration parsing and validation.
//!
//! Every command reads its paths and constants from a [`PrepConfig`]. The
//! defaults reproduce the fixed layout of the original experiment scripts, so
//! running a command without a config file behaves like running the script.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::experiment::LoraParams;
use crate::normalize::{DatasetKind, Gsm8kStyle};

/// Root configuration shared by all commands.
///
/// Relative paths resolve against `work_dir`.
///
/// # Example
///
/// ```rust
/// use mlora_prep::PrepConfig;
///
/// # fn main() -> mlora_prep::Result<()> {
/// let config: PrepConfig = serde_yaml::from_str("work_dir: /tmp/baseline\nsubset:\n  size: 16\n")?;
/// config.validate()?;
///
/// assert_eq!(config.subset.size, 16);
/// assert_eq!(config.data_path(), std::path::PathBuf::from("/tmp/baseline/data"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Base working directory.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory holding normalized and subset JSON files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding raw dataset exports, one sub-directory per dataset.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    /// Dataset normalization settings.
    #[serde(default)]
    pub normalize: NormalizeSettings,

    /// Subset slicing settings.
    #[serde(default)]
    pub subset: SubsetSettings,

    /// Experiment config generation settings.
    #[serde(default)]
    pub experiments: ExperimentSettings,

    /// Token-length statistics settings.
    #[serde(default)]
    pub stats: StatsSettings,

    /// Evaluation settings.
    #[serde(default)]
    pub eval: EvalSettings,
}

fn default_work_dir() -> PathBuf {
    "/scr/dataset/yuke/zien/mLoRA/zien_work/baseline".into()
}
fn default_data_dir() -> PathBuf {
    "data".into()
}
fn default_raw_dir() -> PathBuf {
    "raw".into()
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            data_dir: default_data_dir(),
            raw_dir: default_raw_dir(),
            normalize: NormalizeSettings::default(),
            subset: SubsetSettings::default(),
            experiments: ExperimentSettings::default(),
            stats: StatsSettings::default(),
            eval: EvalSettings::default(),
        }
    }
}

/// Settings for the `normalize` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeSettings {
    /// Datasets to normalize, in order.
    #[serde(default = "default_normalize_datasets")]
    pub datasets: Vec<DatasetKind>,

    /// Split to read from the raw exports.
    #[serde(default = "default_split")]
    pub split: String,

    /// Number of FinQA few-shot demonstrations prepended to each question.
    #[serde(default = "default_few_shot")]
    pub finqa_few_shot: usize,

    /// GSM8K record style.
    #[serde(default)]
    pub gsm8k_style: Gsm8kStyle,
}

fn default_normalize_datasets() -> Vec<DatasetKind> {
    DatasetKind::ALL.to_vec()
}
fn default_split() -> String {
    "train".into()
}
fn default_few_shot() -> usize {
    2
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            datasets: default_normalize_datasets(),
            split: default_split(),
            finqa_few_shot: default_few_shot(),
            gsm8k_style: Gsm8kStyle::default(),
        }
    }
}

/// Settings for the `subset` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetSettings {
    /// Number of leading records kept.
    #[serde(default = "default_subset_size")]
    pub size: usize,

    /// File names (inside the data directory) to slice.
    #[serde(default = "default_subset_files")]
    pub files: Vec<String>,
}

fn default_subset_size() -> usize {
    128
}
fn default_subset_files() -> Vec<String> {
    vec![
        "finqa_train.json".into(),
        "gsm8k_train.json".into(),
        "mrpc_train.json".into(),
        "winogrande_train.json".into(),
    ]
}

impl Default for SubsetSettings {
    fn default() -> Self {
        Self {
            size: default_subset_size(),
            files: default_subset_files(),
        }
    }
}

/// Settings for the `gen-configs` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSettings {
    /// Output directory for generated configs.
    #[serde(default = "default_experiment_output")]
    pub output_dir: PathBuf,

    /// Directory under which adapters are saved by the trainer.
    #[serde(default = "default_adapter_dir")]
    pub adapter_dir: PathBuf,

    /// Datasets that get a config family.
    #[serde(default = "default_experiment_datasets")]
    pub datasets: Vec<DatasetKind>,

    /// Concurrency levels, one file per level.
    #[serde(default = "default_concurrency_levels")]
    pub concurrency_levels: Vec<usize>,

    /// Number of adapter/task pairs per file.
    #[serde(default = "default_tasks_per_file")]
    pub tasks_per_file: usize,

    /// Pool of LoRA hyperparameter tuples.
    #[serde(default = "default_lora_pool")]
    pub lora_pool: Vec<LoraParams>,

    /// Pool of batch sizes.
    #[serde(default = "default_batch_size_pool")]
    pub batch_size_pool: Vec<usize>,

    /// Adapter dropout.
    #[serde(default = "default_dropout")]
    pub dropout: f64,

    /// Prompt template path handed to the trainer.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Epochs per task.
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,

    /// Token cutoff per training sample.
    #[serde(default = "default_cutoff_len")]
    pub cutoff_len: usize,

    /// Checkpoint interval in steps.
    #[serde(default = "default_save_step")]
    pub save_step: usize,

    /// Seed for hyperparameter sampling. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_experiment_output() -> PathBuf {
    "experiment_configs_90tasks".into()
}
fn default_adapter_dir() -> PathBuf {
    "adapters".into()
}
fn default_experiment_datasets() -> Vec<DatasetKind> {
    vec![
        DatasetKind::Gsm8k,
        DatasetKind::Winogrande,
        DatasetKind::Mrpc,
        DatasetKind::Finqa,
    ]
}
fn default_concurrency_levels() -> Vec<usize> {
    vec![1, 2, 4, 8, 16, 32, 64, 128]
}
fn default_tasks_per_file() -> usize {
    90
}
fn default_lora_pool() -> Vec<LoraParams> {
    vec![
        LoraParams::new(128, 32, 1e-4),
        LoraParams::new(128, 64, 1e-4),
        LoraParams::new(64, 32, 1e-4),
        LoraParams::new(64, 16, 2e-5),
        LoraParams::new(32, 32, 5e-5),
    ]
}
fn default_batch_size_pool() -> Vec<usize> {
    vec![2, 4, 8, 16]
}
fn default_dropout() -> f64 {
    0.05
}
fn default_prompt() -> String {
    "demo/prompt.yaml".into()
}
fn default_num_epochs() -> usize {
    1
}
fn default_cutoff_len() -> usize {
    512
}
fn default_save_step() -> usize {
    10000
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            output_dir: default_experiment_output(),
            adapter_dir: default_adapter_dir(),
            datasets: default_experiment_datasets(),
            concurrency_levels: default_concurrency_levels(),
            tasks_per_file: default_tasks_per_file(),
            lora_pool: default_lora_pool(),
            batch_size_pool: default_batch_size_pool(),
            dropout: default_dropout(),
            prompt: default_prompt(),
            num_epochs: default_num_epochs(),
            cutoff_len: default_cutoff_len(),
            save_step: default_save_step(),
            seed: None,
        }
    }
}

/// Settings for the `token-stats` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSettings {
    /// Directory containing `tokenizer.json`, or the file itself.
    #[serde(default = "default_base_model")]
    pub tokenizer: PathBuf,

    /// Record file to measure.
    #[serde(default = "default_stats_data")]
    pub data: PathBuf,
}

fn default_base_model() -> PathBuf {
    "/scr/dataset/yuke/models/Llama-3.1-8B-Instruct".into()
}
fn default_stats_data() -> PathBuf {
    "data/gsm8k_train.json".into()
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            tokenizer: default_base_model(),
            data: default_stats_data(),
        }
    }
}

/// Settings for the `eval` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSettings {
    /// Base model directory.
    #[serde(default = "default_base_model")]
    pub base_model: PathBuf,

    /// LoRA adapter directory. `None` evaluates the base model alone.
    #[serde(default = "default_eval_adapter")]
    pub adapter: Option<PathBuf>,

    /// GSM8K test split export.
    #[serde(default = "default_test_split")]
    pub test_split: PathBuf,

    /// Evaluate only the first N questions.
    #[serde(default)]
    pub sample_size: Option<usize>,

    /// Maximum number of generated tokens per question.
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Sample instead of taking the argmax token.
    #[serde(default)]
    pub do_sample: bool,

    /// Sampling temperature, used when `do_sample` is set.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Sampling seed, used when `do_sample` is set.
    #[serde(default = "default_eval_seed")]
    pub seed: u64,

    /// Optional JSON summary output.
    #[serde(default)]
    pub report: Option<PathBuf>,
}

fn default_eval_adapter() -> Option<PathBuf> {
    Some("adapters/llama3_gsm8k_res".into())
}
fn default_test_split() -> PathBuf {
    "raw/gsm8k/test.jsonl".into()
}
fn default_max_new_tokens() -> usize {
    256
}
fn default_temperature() -> f64 {
    0.1
}
fn default_eval_seed() -> u64 {
    299_792_458
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            base_model: default_base_model(),
            adapter: default_eval_adapter(),
            test_split: default_test_split(),
            sample_size: None,
            max_new_tokens: default_max_new_tokens(),
            do_sample: false,
            temperature: default_temperature(),
            seed: default_eval_seed(),
            report: None,
        }
    }
}

impl PrepConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a path against `work_dir`. Absolute paths are returned as is.
    #[must_use]
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    /// Directory with normalized record files.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    /// Raw export file for a dataset split, preferring `.jsonl` over `.json`.
    #[must_use]
    pub fn raw_split_path(&self, dataset: DatasetKind, split: &str) -> PathBuf {
        let dir = self.resolve(&self.raw_dir).join(dataset.name());
        let jsonl = dir.join(format!("{split}.jsonl"));
        if jsonl.exists() {
            return jsonl;
        }
        let json = dir.join(format!("{split}.json"));
        if json.exists() {
            json
        } else {
            jsonl
        }
    }

    /// Training data file referenced by generated experiment configs.
    #[must_use]
    pub fn experiment_data_path(&self, dataset: DatasetKind) -> PathBuf {
        self.data_path().join(format!(
            "{}_subset_{}.json",
            dataset.output_stem(),
            self.subset.size
        ))
    }

    /// Validate the configuration.
    ///
    /// ```rust
    /// use mlora_prep::PrepConfig;
    ///
    /// let mut config = PrepConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.experiments.batch_size_pool.clear();
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.subset.size == 0 {
            return Err(PrepError::Config("subset.size must be > 0".into()));
        }

        let exp = &self.experiments;
        if exp.concurrency_levels.is_empty() {
            return Err(PrepError::Config(
                "experiments.concurrency_levels must not be empty".into(),
            ));
        }
        if exp.concurrency_levels.contains(&0) {
            return Err(PrepError::Config(
                "experiments.concurrency_levels must be > 0".into(),
            ));
        }
        if exp.tasks_per_file == 0 {
            return Err(PrepError::Config(
                "experiments.tasks_per_file must be > 0".into(),
            ));
        }
        if exp.lora_pool.is_empty() {
            return Err(PrepError::Config(
                "experiments.lora_pool must not be empty".into(),
            ));
        }
        if exp.lora_pool.iter().any(|p| p.r == 0) {
            return Err(PrepError::Config("lora_pool r must be > 0".into()));
        }
        if exp.batch_size_pool.is_empty() || exp.batch_size_pool.contains(&0) {
            return Err(PrepError::Config(
                "experiments.batch_size_pool must hold positive sizes".into(),
            ));
        }
        if !(0.0..1.0).contains(&exp.dropout) {
            return Err(PrepError::Config(
                "experiments.dropout must be in [0, 1)".into(),
            ));
        }

        if self.eval.max_new_tokens == 0 {
            return Err(PrepError::Config("eval.max_new_tokens must be > 0".into()));
        }
        if self.eval.do_sample && self.eval.temperature <= 0.0 {
            return Err(PrepError::Config(
                "eval.temperature must be > 0 when do_sample is set".into(),
            ));
        }

        Ok(())
    }
}
