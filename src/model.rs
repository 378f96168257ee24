//! Model loading and text generation.
//!
//! The evaluator runs a Llama-architecture checkpoint with an optional PEFT
//! LoRA adapter. Adapter deltas are folded into the base weights before the
//! model is built, so generation runs at base-model cost.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use serde::Deserialize;

use crate::config::EvalSettings;
use crate::error::{PrepError, Result};
use crate::eval::Generate;

const FORCE_CPU_VAR: &str = "MLORA_PREP_FORCE_CPU";
const CUDA_DEVICE_VAR: &str = "MLORA_PREP_CUDA_DEVICE";

fn flag_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Pick the inference device.
///
/// CUDA is used when the `cuda` feature is compiled in and a device is
/// available, unless `MLORA_PREP_FORCE_CPU=1`.
#[must_use]
pub fn select_device() -> Device {
    let force_cpu = flag_set(std::env::var(FORCE_CPU_VAR).ok().as_deref());
    let ordinal = std::env::var(CUDA_DEVICE_VAR)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    if !force_cpu && cfg!(feature = "cuda") {
        match Device::cuda_if_available(ordinal) {
            Ok(device @ Device::Cuda(_)) => {
                tracing::info!("Inference device: CUDA (device {ordinal})");
                device
            }
            Ok(_) => {
                tracing::warn!("CUDA not available; falling back to CPU.");
                Device::Cpu
            }
            Err(err) => {
                tracing::warn!("CUDA init failed ({err}); falling back to CPU.");
                Device::Cpu
            }
        }
    } else {
        if force_cpu {
            tracing::info!("CPU mode forced via {FORCE_CPU_VAR}=1");
        } else {
            tracing::debug!("CUDA feature disabled; running on CPU");
        }
        Device::Cpu
    }
}

/// Working dtype for a device.
#[must_use]
pub fn dtype_for(device: &Device) -> DType {
    if device.is_cuda() {
        DType::BF16
    } else {
        DType::F32
    }
}

/// Resolve a model directory from a local path or a hub id in the local cache.
///
/// Cached repos resolve to the snapshot named by `refs/main`, or the first
/// snapshot found.
pub fn resolve_model_path(model: &Path) -> Result<PathBuf> {
    if model.exists() {
        return Ok(model.to_path_buf());
    }

    let model_id = model.to_string_lossy();
    let cache_dir = std::env::var("HF_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".cache/huggingface")))
        .unwrap_or_else(|_| PathBuf::from("/tmp/huggingface"));
    let repo = cache_dir
        .join("hub")
        .join(format!("models--{}", model_id.replace('/', "--")));

    let snapshots = repo.join("snapshots");
    if let Ok(revision) = std::fs::read_to_string(repo.join("refs/main")) {
        let snapshot = snapshots.join(revision.trim());
        if snapshot.exists() {
            return Ok(snapshot);
        }
    }
    if let Ok(entries) = std::fs::read_dir(&snapshots) {
        if let Some(entry) = entries.filter_map(std::result::Result::ok).find(|e| e.path().is_dir()) {
            return Ok(entry.path());
        }
    }

    Err(PrepError::Model(format!(
        "Model not found at '{model_id}' or in the hub cache at '{}'",
        repo.display()
    )))
}

/// Load a tokenizer from a model directory or a `tokenizer.json` path.
pub fn load_tokenizer(path: &Path) -> Result<tokenizers::Tokenizer> {
    let file = if path.is_dir() {
        path.join("tokenizer.json")
    } else {
        path.to_path_buf()
    };

    if !file.exists() {
        return Err(PrepError::Tokenizer(
            format!("tokenizer.json not found at {}", file.display()).into(),
        ));
    }

    tokenizers::Tokenizer::from_file(&file)
        .map_err(|e| PrepError::Tokenizer(format!("Failed to load tokenizer: {e}").into()))
}

/// Load base weights from `model.safetensors` or a sharded index.
pub fn load_base_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let single = model_dir.join("model.safetensors");
    if single.exists() {
        return candle_core::safetensors::load(&single, device)
            .map_err(|e| PrepError::Model(format!("Failed to load safetensors: {e}")));
    }

    let index = model_dir.join("model.safetensors.index.json");
    if !index.exists() {
        return Err(PrepError::Model(format!(
            "No model weights found in {}. Expected model.safetensors or model.safetensors.index.json",
            model_dir.display()
        )));
    }

    #[derive(Deserialize)]
    struct ShardIndex {
        weight_map: HashMap<String, String>,
    }

    let index: ShardIndex = serde_json::from_str(&std::fs::read_to_string(&index)?)?;
    let shards: BTreeSet<&String> = index.weight_map.values().collect();

    let mut weights = HashMap::new();
    for shard in shards {
        tracing::debug!("Loading shard {shard}");
        let tensors = candle_core::safetensors::load(model_dir.join(shard), device)
            .map_err(|e| PrepError::Model(format!("Failed to load shard {shard}: {e}")))?;
        weights.extend(tensors);
    }
    Ok(weights)
}

/// The parts of a PEFT `adapter_config.json` needed for merging.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Rank.
    pub r: usize,
    /// Scaling numerator.
    pub lora_alpha: f64,
    /// Adapted module names.
    #[serde(default)]
    pub target_modules: Vec<String>,
}

impl AdapterConfig {
    /// Delta scaling factor `alpha / r`.
    #[must_use]
    pub fn scale(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let r = self.r as f64;
        self.lora_alpha / r
    }

    /// Whether the base weight `target` belongs to one of the declared
    /// modules. An empty list declares nothing and covers every weight.
    #[must_use]
    pub fn covers(&self, target: &str) -> bool {
        let module = target.strip_suffix(".weight").unwrap_or(target);
        self.target_modules.is_empty()
            || self
                .target_modules
                .iter()
                .any(|m| module == m || module.strip_suffix(m.as_str()).is_some_and(|p| p.ends_with('.')))
    }
}

/// A LoRA factor pair targeting one base weight.
#[derive(Debug, Clone)]
pub struct LoraPair {
    /// Base weight name, e.g. `model.layers.0.self_attn.q_proj.weight`.
    pub target: String,
    /// Down projection, `(r, in)`.
    pub a: Tensor,
    /// Up projection, `(out, r)`.
    pub b: Tensor,
}

/// Split a PEFT tensor name into the base weight it targets and its factor.
///
/// ```rust
/// use mlora_prep::model::peft_target;
///
/// assert_eq!(
///     peft_target("base_model.model.model.layers.3.mlp.up_proj.lora_B.weight"),
///     Some(("model.layers.3.mlp.up_proj.weight".to_string(), 'B'))
/// );
/// assert_eq!(peft_target("model.norm.weight"), None);
/// ```
#[must_use]
pub fn peft_target(name: &str) -> Option<(String, char)> {
    let name = name.strip_prefix("base_model.model.").unwrap_or(name);
    for (factor, suffixes) in [
        ('A', [".lora_A.weight", ".lora_A.default.weight"]),
        ('B', [".lora_B.weight", ".lora_B.default.weight"]),
    ] {
        for suffix in suffixes {
            if let Some(module) = name.strip_suffix(suffix) {
                return Some((format!("{module}.weight"), factor));
            }
        }
    }
    None
}

/// Pair up `lora_A`/`lora_B` tensors by target weight.
pub fn lora_pairs(tensors: HashMap<String, Tensor>) -> Result<Vec<LoraPair>> {
    let mut a_factors = HashMap::new();
    let mut b_factors = HashMap::new();
    for (name, tensor) in tensors {
        match peft_target(&name) {
            Some((target, 'A')) => {
                a_factors.insert(target, tensor);
            }
            Some((target, _)) => {
                b_factors.insert(target, tensor);
            }
            None => tracing::debug!("Ignoring adapter tensor {name}"),
        }
    }

    let mut pairs = Vec::with_capacity(a_factors.len());
    for (target, a) in a_factors {
        let b = b_factors.remove(&target).ok_or_else(|| {
            PrepError::Model(format!("Adapter has lora_A but no lora_B for {target}"))
        })?;
        pairs.push(LoraPair { target, a, b });
    }
    if let Some(target) = b_factors.keys().next() {
        return Err(PrepError::Model(format!(
            "Adapter has lora_B but no lora_A for {target}"
        )));
    }

    pairs.sort_by(|x, y| x.target.cmp(&y.target));
    Ok(pairs)
}

/// Load a PEFT adapter directory.
pub fn load_adapter(dir: &Path, device: &Device) -> Result<(AdapterConfig, Vec<LoraPair>)> {
    let config_path = dir.join("adapter_config.json");
    let config: AdapterConfig = serde_json::from_str(
        &std::fs::read_to_string(&config_path)
            .map_err(|e| PrepError::Model(format!("Failed to read {}: {e}", config_path.display())))?,
    )?;
    if config.r == 0 {
        return Err(PrepError::Model("adapter rank must be > 0".into()));
    }

    let safetensors = dir.join("adapter_model.safetensors");
    let pickle = dir.join("adapter_model.bin");
    let tensors = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else if pickle.exists() {
        candle_core::pickle::read_all(&pickle)?
            .into_iter()
            .map(|(name, t)| -> Result<(String, Tensor)> { Ok((name, t.to_device(device)?)) })
            .collect::<Result<HashMap<_, _>>>()?
    } else {
        return Err(PrepError::Model(format!(
            "No adapter weights found in {}. Expected adapter_model.safetensors or adapter_model.bin",
            dir.display()
        )));
    };

    let pairs = lora_pairs(tensors)?;
    for pair in pairs.iter().filter(|p| !config.covers(&p.target)) {
        tracing::warn!(
            "Adapter weight {} is outside target_modules {:?}",
            pair.target,
            config.target_modules
        );
    }
    tracing::info!(
        "Loaded adapter: r={}, alpha={}, {} LoRA pairs",
        config.r,
        config.lora_alpha,
        pairs.len()
    );
    Ok((config, pairs))
}

/// Fold `scale * B·A` into each targeted base weight. Returns the number of
/// merged weights.
pub fn merge_lora(
    weights: &mut HashMap<String, Tensor>,
    pairs: &[LoraPair],
    scale: f64,
) -> Result<usize> {
    for pair in pairs {
        let base = weights.get(&pair.target).ok_or_else(|| {
            PrepError::Model(format!("Adapter targets unknown weight {}", pair.target))
        })?;

        let delta = pair
            .b
            .to_dtype(DType::F32)?
            .matmul(&pair.a.to_dtype(DType::F32)?)?
            .affine(scale, 0.0)?;
        if delta.dims() != base.dims() {
            return Err(PrepError::Model(format!(
                "Shape mismatch for {}: base {:?}, delta {:?}",
                pair.target,
                base.dims(),
                delta.dims()
            )));
        }

        let merged = base
            .to_dtype(DType::F32)?
            .add(&delta)?
            .to_dtype(base.dtype())?;
        weights.insert(pair.target.clone(), merged);
    }
    Ok(pairs.len())
}

/// Llama model with a KV-cached decoding loop.
pub struct LlamaGenerator {
    model: Llama,
    config: Config,
    tokenizer: tokenizers::Tokenizer,
    device: Device,
    dtype: DType,
    eos: Option<LlamaEosToks>,
    logits_processor: LogitsProcessor,
}

impl LlamaGenerator {
    /// Load base model, tokenizer and (optionally) merged adapter.
    pub fn load(settings: &EvalSettings, base_model: &Path, adapter: Option<&Path>) -> Result<Self> {
        let device = select_device();
        let dtype = dtype_for(&device);
        let model_dir = resolve_model_path(base_model)?;
        tracing::info!("Loading model from {}", model_dir.display());

        let tokenizer = load_tokenizer(&model_dir)?;
        let llama_config: LlamaConfig = serde_json::from_str(
            &std::fs::read_to_string(model_dir.join("config.json"))
                .map_err(|e| PrepError::Model(format!("Failed to read config.json: {e}")))?,
        )
        .map_err(|e| PrepError::Model(format!("Failed to parse config.json: {e}")))?;
        let config = llama_config.into_config(false);

        let mut weights = load_base_weights(&model_dir, &device)?;
        if let Some(adapter) = adapter {
            let (adapter_config, pairs) = load_adapter(adapter, &device)?;
            let merged = merge_lora(&mut weights, &pairs, adapter_config.scale())?;
            tracing::info!("Merged {merged} adapter weights from {}", adapter.display());
        }

        let vb = VarBuilder::from_tensors(weights, dtype, &device);
        let model = Llama::load(vb, &config)?;

        let eos = config.eos_token_id.clone().or_else(|| {
            tokenizer
                .token_to_id("</s>")
                .or_else(|| tokenizer.token_to_id("<|eot_id|>"))
                .map(LlamaEosToks::Single)
        });

        let sampling = if settings.do_sample {
            Sampling::All {
                temperature: settings.temperature,
            }
        } else {
            Sampling::ArgMax
        };

        Ok(Self {
            model,
            config,
            tokenizer,
            device,
            dtype,
            eos,
            logits_processor: LogitsProcessor::from_sampling(settings.seed, sampling),
        })
    }

    fn is_eos(&self, token: u32) -> bool {
        match &self.eos {
            Some(LlamaEosToks::Single(id)) => *id == token,
            Some(LlamaEosToks::Multiple(ids)) => ids.contains(&token),
            None => false,
        }
    }
}

impl Generate for LlamaGenerator {
    fn generate(&mut self, prompt: &str, max_new_tokens: usize) -> Result<String> {
        let mut tokens = self.tokenizer.encode(prompt, true)?.get_ids().to_vec();
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut generated = Vec::with_capacity(max_new_tokens);
        let mut index_pos = 0;

        for index in 0..max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let context = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;

            let logits = self.model.forward(&input, index_pos, &mut cache)?.squeeze(0)?;
            index_pos += context.len();

            let next = self.logits_processor.sample(&logits)?;
            if self.is_eos(next) {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }

        Ok(self.tokenizer.decode(&generated, true)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn tensor(data: &[f32], shape: (usize, usize)) -> Tensor {
        Tensor::from_slice(data, shape, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_flag_parsing() {
        assert!(flag_set(Some("1")));
        assert!(flag_set(Some("TRUE")));
        assert!(!flag_set(Some("0")));
        assert!(!flag_set(None));
    }

    #[test]
    fn test_cpu_dtype() {
        assert_eq!(dtype_for(&Device::Cpu), DType::F32);
    }

    #[test]
    fn test_peft_target_variants() {
        assert_eq!(
            peft_target("base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight"),
            Some(("model.layers.0.self_attn.q_proj.weight".into(), 'A'))
        );
        assert_eq!(
            peft_target("model.layers.1.self_attn.v_proj.lora_B.default.weight"),
            Some(("model.layers.1.self_attn.v_proj.weight".into(), 'B'))
        );
        assert_eq!(peft_target("base_model.model.lm_head.weight"), None);
    }

    #[test]
    fn test_adapter_scale() {
        let config: AdapterConfig =
            serde_json::from_str(r#"{"r": 64, "lora_alpha": 16, "bias": "none"}"#).unwrap();
        assert!((config.scale() - 0.25).abs() < f64::EPSILON);
        assert!(config.target_modules.is_empty());
    }

    #[test]
    fn test_adapter_covers_declared_modules() {
        let config: AdapterConfig =
            serde_json::from_str(r#"{"r": 8, "lora_alpha": 16, "target_modules": ["q_proj", "v_proj"]}"#)
                .unwrap();
        assert!(config.covers("model.layers.0.self_attn.q_proj.weight"));
        assert!(config.covers("v_proj.weight"));
        assert!(!config.covers("model.layers.0.self_attn.k_proj.weight"));
        assert!(!config.covers("model.layers.0.mlp.xq_proj.weight"));

        let open: AdapterConfig = serde_json::from_str(r#"{"r": 8, "lora_alpha": 16}"#).unwrap();
        assert!(open.covers("model.layers.0.mlp.down_proj.weight"));
    }

    #[test]
    fn test_lora_pairs_match_factors() {
        let mut tensors = HashMap::new();
        tensors.insert("base_model.model.m.q_proj.lora_A.weight".to_string(), tensor(&[1.0, 2.0], (1, 2)));
        tensors.insert("base_model.model.m.q_proj.lora_B.weight".to_string(), tensor(&[3.0, 4.0], (2, 1)));
        tensors.insert("base_model.model.extra".to_string(), tensor(&[0.0], (1, 1)));

        let pairs = lora_pairs(tensors).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].target, "m.q_proj.weight");
    }

    #[test]
    fn test_lora_pairs_missing_factor() {
        let mut tensors = HashMap::new();
        tensors.insert("m.k_proj.lora_B.weight".to_string(), tensor(&[1.0], (1, 1)));
        let err = lora_pairs(tensors).unwrap_err();
        assert!(err.to_string().contains("no lora_A"));
    }

    #[test]
    fn test_merge_lora_adds_scaled_product() {
        let mut weights = HashMap::new();
        weights.insert("w.weight".to_string(), tensor(&[1.0, 0.0, 0.0, 1.0], (2, 2)));
        let pairs = vec![LoraPair {
            target: "w.weight".into(),
            a: tensor(&[1.0, 2.0], (1, 2)),
            b: tensor(&[3.0, 4.0], (2, 1)),
        }];

        let merged = merge_lora(&mut weights, &pairs, 0.5).unwrap();
        assert_eq!(merged, 1);

        // B·A = [[3, 6], [4, 8]], halved and added to identity
        let values: Vec<Vec<f32>> = weights["w.weight"].to_vec2().unwrap();
        assert_eq!(values, vec![vec![2.5, 3.0], vec![2.0, 5.0]]);
    }

    #[test]
    fn test_merge_lora_shape_mismatch() {
        let mut weights = HashMap::new();
        weights.insert("w.weight".to_string(), tensor(&[1.0; 6], (2, 3)));
        let pairs = vec![LoraPair {
            target: "w.weight".into(),
            a: tensor(&[1.0, 2.0], (1, 2)),
            b: tensor(&[3.0, 4.0], (2, 1)),
        }];
        assert!(merge_lora(&mut weights, &pairs, 1.0).is_err());
    }

    #[test]
    fn test_merge_lora_unknown_target() {
        let mut weights = HashMap::new();
        let pairs = vec![LoraPair {
            target: "missing.weight".into(),
            a: tensor(&[1.0], (1, 1)),
            b: tensor(&[1.0], (1, 1)),
        }];
        assert!(merge_lora(&mut weights, &pairs, 1.0).is_err());
    }

    #[test]
    fn test_load_adapter_safetensors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("adapter_config.json"),
            r#"{"r": 1, "lora_alpha": 2, "target_modules": ["q_proj"]}"#,
        )
        .unwrap();
        let mut tensors = HashMap::new();
        tensors.insert("base_model.model.l.q_proj.lora_A.weight".to_string(), tensor(&[1.0, 1.0], (1, 2)));
        tensors.insert("base_model.model.l.q_proj.lora_B.weight".to_string(), tensor(&[1.0, 1.0], (2, 1)));
        candle_core::safetensors::save(&tensors, dir.path().join("adapter_model.safetensors")).unwrap();

        let (config, pairs) = load_adapter(dir.path(), &Device::Cpu).unwrap();
        assert!((config.scale() - 2.0).abs() < f64::EPSILON);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].target, "l.q_proj.weight");
    }

    #[test]
    fn test_load_adapter_without_weights() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("adapter_config.json"), r#"{"r": 8, "lora_alpha": 16}"#).unwrap();
        let err = load_adapter(dir.path(), &Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("No adapter weights"));
    }

    #[test]
    fn test_load_base_weights_sharded() {
        let dir = TempDir::new().unwrap();
        let mut first = HashMap::new();
        first.insert("a.weight".to_string(), tensor(&[1.0], (1, 1)));
        let mut second = HashMap::new();
        second.insert("b.weight".to_string(), tensor(&[2.0], (1, 1)));
        candle_core::safetensors::save(&first, dir.path().join("model-00001-of-00002.safetensors")).unwrap();
        candle_core::safetensors::save(&second, dir.path().join("model-00002-of-00002.safetensors")).unwrap();
        std::fs::write(
            dir.path().join("model.safetensors.index.json"),
            r#"{"metadata": {}, "weight_map": {
                "a.weight": "model-00001-of-00002.safetensors",
                "b.weight": "model-00002-of-00002.safetensors"}}"#,
        )
        .unwrap();

        let weights = load_base_weights(dir.path(), &Device::Cpu).unwrap();
        assert_eq!(weights.len(), 2);
        assert!(weights.contains_key("b.weight"));
    }

    #[test]
    fn test_load_base_weights_missing() {
        let dir = TempDir::new().unwrap();
        let err = load_base_weights(dir.path(), &Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("No model weights"));
    }

    #[test]
    fn test_resolve_model_path_local_and_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_model_path(dir.path()).unwrap(), dir.path());
        assert!(resolve_model_path(Path::new("no-such-org/no-such-model-xyz")).is_err());
    }

    const TINY_VOCAB: [&str; 8] = ["<unk>", "</s>", "<sep>", "a", "b", "c", "d", "e"];

    /// Next token for each token id: a -> b -> <sep> -> c -> </s>, e -> d -> d.
    const TINY_NEXT: [usize; 8] = [0, 1, 5, 4, 2, 1, 6, 6];

    fn tiny_tokenizer() -> tokenizers::Tokenizer {
        let vocab = TINY_VOCAB
            .iter()
            .enumerate()
            .map(|(id, token)| format!("\"{token}\": {id}"))
            .collect::<Vec<_>>()
            .join(", ");
        let json = format!(
            r#"{{
                "version": "1.0",
                "truncation": null,
                "padding": null,
                "added_tokens": [
                    {{"id": 1, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}},
                    {{"id": 2, "content": "<sep>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}}
                ],
                "normalizer": null,
                "pre_tokenizer": {{"type": "Whitespace"}},
                "post_processor": null,
                "decoder": null,
                "model": {{"type": "WordLevel", "vocab": {{{vocab}}}, "unk_token": "<unk>"}}
            }}"#
        );
        tokenizers::Tokenizer::from_str(&json).unwrap()
    }

    /// One-layer Llama whose blocks are zeroed, so the last token's one-hot
    /// embedding reaches `lm_head` unchanged and picks `TINY_NEXT[token]`.
    fn tiny_generator() -> LlamaGenerator {
        let device = Device::Cpu;
        let n = TINY_VOCAB.len();
        let config: LlamaConfig = serde_json::from_str(
            r#"{"hidden_size": 8, "intermediate_size": 4, "vocab_size": 8,
                "num_hidden_layers": 1, "num_attention_heads": 2, "num_key_value_heads": 2,
                "rms_norm_eps": 1e-5, "bos_token_id": null, "eos_token_id": 1,
                "rope_scaling": null, "max_position_embeddings": 8, "tie_word_embeddings": false}"#,
        )
        .unwrap();
        let config = config.into_config(false);

        let mut lm_head = vec![0f32; n * n];
        for (token, next) in TINY_NEXT.iter().enumerate() {
            lm_head[next * n + token] = 1.0;
        }

        let zeros = |shape: (usize, usize)| Tensor::zeros(shape, DType::F32, &device).unwrap();
        let ones = || Tensor::ones(n, DType::F32, &device).unwrap();
        let mut weights = HashMap::new();
        weights.insert("model.embed_tokens.weight".to_string(), Tensor::eye(n, DType::F32, &device).unwrap());
        weights.insert("lm_head.weight".to_string(), tensor(&lm_head, (n, n)));
        weights.insert("model.norm.weight".to_string(), ones());
        let layer = "model.layers.0";
        for proj in ["q_proj", "k_proj", "v_proj", "o_proj"] {
            weights.insert(format!("{layer}.self_attn.{proj}.weight"), zeros((n, n)));
        }
        weights.insert(format!("{layer}.mlp.gate_proj.weight"), zeros((4, n)));
        weights.insert(format!("{layer}.mlp.up_proj.weight"), zeros((4, n)));
        weights.insert(format!("{layer}.mlp.down_proj.weight"), zeros((n, 4)));
        weights.insert(format!("{layer}.input_layernorm.weight"), ones());
        weights.insert(format!("{layer}.post_attention_layernorm.weight"), ones());

        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = Llama::load(vb, &config).unwrap();
        LlamaGenerator {
            model,
            eos: config.eos_token_id.clone(),
            config,
            tokenizer: tiny_tokenizer(),
            device,
            dtype: DType::F32,
            logits_processor: LogitsProcessor::from_sampling(0, Sampling::ArgMax),
        }
    }

    #[test]
    fn test_generate_stops_at_eos_and_skips_special_tokens() {
        let mut generator = tiny_generator();
        // a -> b -> <sep> -> c -> </s>
        assert_eq!(generator.generate("a", 6).unwrap(), "b c");
    }

    #[test]
    fn test_generate_returns_only_new_tokens_within_budget() {
        let mut generator = tiny_generator();
        // three prompt tokens plus up to five new ones fit the 8-position
        // rotary table only when each cached step advances by one position
        assert_eq!(generator.generate("e e e", 5).unwrap(), "d d d d d");
        assert_eq!(generator.generate("e", 2).unwrap(), "d d");
        assert_eq!(generator.generate("e", 0).unwrap(), "");
    }

    #[test]
    fn test_generate_immediate_eos_is_empty() {
        let mut generator = tiny_generator();
        assert_eq!(generator.generate("c", 4).unwrap(), "");
    }

    #[test]
    fn test_load_tokenizer_missing() {
        let dir = TempDir::new().unwrap();
        let err = load_tokenizer(dir.path()).unwrap_err();
        assert!(matches!(err, PrepError::Tokenizer(_)));
    }

    #[test]
    fn test_load_tokenizer_word_level() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("tokenizer.json"),
            r#"{
                "version": "1.0",
                "truncation": null,
                "padding": null,
                "added_tokens": [],
                "normalizer": null,
                "pre_tokenizer": {"type": "Whitespace"},
                "post_processor": null,
                "decoder": null,
                "model": {"type": "WordLevel", "vocab": {"[UNK]": 0, "hello": 1, "world": 2}, "unk_token": "[UNK]"}
            }"#,
        )
        .unwrap();

        let tokenizer = load_tokenizer(dir.path()).unwrap();
        let ids = tokenizer.encode("hello world", true).unwrap().get_ids().to_vec();
        assert_eq!(ids, vec![1, 2]);

        use crate::stats::TokenCount;
        assert_eq!(tokenizer.count_tokens("hello there world").unwrap(), 3);
    }
}
