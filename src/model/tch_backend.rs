use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::json;
use tch::{CModule, Device, IValue, Kind, Tensor, no_grad};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::{
    config::{BackendSettings, DeviceSelection, Precision},
    credentials::HfToken,
    error::{ServiceError, StartupError},
    model::{
        ConfigSchema, GenerationEngine, GenerationOptions, ModelArtifacts, ModelBackend,
        config::value, sampling,
    },
};

const EOS_CANDIDATES: [&str; 4] = ["<|endoftext|>", "</s>", "<eos>", "<|end_of_text|>"];

#[derive(Debug, Clone, PartialEq)]
pub struct TchGenerationConfig {
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub do_sample: bool,
    pub eos_token_id: Option<i64>,
}

impl Default for TchGenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 50,
            top_p: 1.0,
            repetition_penalty: 1.0,
            do_sample: false,
            eos_token_id: None,
        }
    }
}

static SCHEMA: Lazy<ConfigSchema<TchGenerationConfig>> = Lazy::new(|| {
    ConfigSchema::<TchGenerationConfig>::new()
        .field(
            "temperature",
            |c| json!(c.temperature),
            |c, v| {
                c.temperature = value::to_non_negative_f64(v)?;
                Ok(())
            },
        )
        .field(
            "top_k",
            |c| json!(c.top_k),
            |c, v| {
                c.top_k = value::to_usize(v)?;
                Ok(())
            },
        )
        .field(
            "top_p",
            |c| json!(c.top_p),
            |c, v| {
                c.top_p = value::to_unit_interval(v)?;
                Ok(())
            },
        )
        .field(
            "repetition_penalty",
            |c| json!(c.repetition_penalty),
            |c, v| {
                let penalty = value::to_f64(v)?;
                if penalty <= 0.0 {
                    return Err(format!("expected a positive number, got {penalty}"));
                }
                c.repetition_penalty = penalty;
                Ok(())
            },
        )
        .field(
            "do_sample",
            |c| json!(c.do_sample),
            |c, v| {
                c.do_sample = value::to_bool(v)?;
                Ok(())
            },
        )
        .field(
            "eos_token_id",
            |c| json!(c.eos_token_id),
            |c, v| {
                c.eos_token_id = value::to_optional_i64(v)?;
                Ok(())
            },
        )
});

/// A TorchScript causal language model and its tokenizer.
pub struct TchBackend {
    model_id: String,
    tokenizer: Arc<Tokenizer>,
    module: Arc<Mutex<CModule>>,
    device: Device,
    initial: TchGenerationConfig,
}

impl TchBackend {
    pub fn load(settings: BackendSettings, token: &HfToken) -> Result<Self, StartupError> {
        let artifacts = ModelArtifacts::resolve(&settings, token)?;

        let device = resolve_device(settings.device);
        let kind = match settings.precision.resolve(device.is_cuda()) {
            Precision::BFloat16 => Kind::BFloat16,
            Precision::Float16 => Kind::Half,
            Precision::Float32 | Precision::Auto => Kind::Float,
        };
        if let Some(seed) = settings.seed {
            tch::manual_seed(seed);
        }

        let tokenizer = Tokenizer::from_file(artifacts.tokenizer_path.as_path())
            .map_err(|e| StartupError::ModelLoad(format!("tokenizer: {e}")))?;

        let mut module = CModule::load_on_device(&artifacts.module_path, device)
            .map_err(|e| StartupError::ModelLoad(e.to_string()))?;
        module.to(device, kind, false);
        module.set_eval();

        let initial = TchGenerationConfig {
            eos_token_id: EOS_CANDIDATES
                .iter()
                .find_map(|token| tokenizer.token_to_id(token))
                .map(i64::from),
            ..TchGenerationConfig::default()
        };
        info!(model = %settings.model_id, ?device, ?kind, "model loaded");

        Ok(Self {
            model_id: settings.model_id,
            tokenizer: Arc::new(tokenizer),
            module: Arc::new(Mutex::new(module)),
            device,
            initial,
        })
    }
}

impl ModelBackend for TchBackend {
    type Config = TchGenerationConfig;
    type Engine = TchPipeline;

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn schema(&self) -> &ConfigSchema<TchGenerationConfig> {
        &SCHEMA
    }

    fn initial_config(&self) -> TchGenerationConfig {
        self.initial.clone()
    }

    fn build_pipeline(&self, config: &TchGenerationConfig) -> Result<TchPipeline, ServiceError> {
        Ok(TchPipeline {
            tokenizer: self.tokenizer.clone(),
            module: self.module.clone(),
            device: self.device,
            config: config.clone(),
        })
    }
}

pub struct TchPipeline {
    tokenizer: Arc<Tokenizer>,
    module: Arc<Mutex<CModule>>,
    device: Device,
    config: TchGenerationConfig,
}

impl GenerationEngine for TchPipeline {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ServiceError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let prompt_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        if prompt_ids.is_empty() {
            return Err(ServiceError::Tokenizer("prompt produced no tokens".into()));
        }

        let ids = self.continue_sequence(prompt_ids.clone(), options.max_new_tokens)?;
        render(&self.tokenizer, prompt, &prompt_ids, &ids)
    }
}

impl TchPipeline {
    fn continue_sequence(
        &self,
        mut input_ids: Vec<i64>,
        max_new_tokens: usize,
    ) -> Result<Vec<i64>, ServiceError> {
        no_grad(|| {
            let module = self.module.lock();

            for _ in 0..max_new_tokens {
                let input_tensor = Tensor::from_slice(&input_ids)
                    .reshape([1, input_ids.len() as i64])
                    .to(self.device);

                let output = module
                    .forward_is(&[IValue::Tensor(input_tensor)])
                    .map_err(|e| ServiceError::Generation(e.to_string()))?;

                // Traced models return either bare logits or (logits, past, ...).
                let logits = match output {
                    IValue::Tensor(t) => t,
                    IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                        IValue::Tensor(t) => t.shallow_clone(),
                        _ => {
                            return Err(ServiceError::Generation(
                                "expected tensor as first tuple element".into(),
                            ));
                        }
                    },
                    _ => {
                        return Err(ServiceError::Generation(
                            "unexpected model output format".into(),
                        ));
                    }
                };

                let last = logits
                    .select(1, -1)
                    .squeeze()
                    .to_kind(Kind::Float)
                    .to_device(Device::Cpu)
                    .contiguous();
                let scores = Vec::<f32>::try_from(&last)
                    .map_err(|e| ServiceError::Generation(e.to_string()))?;

                let next = next_token(&self.config, scores, &input_ids, || {
                    Tensor::rand([1], (Kind::Float, Device::Cpu)).double_value(&[0]) as f32
                })?;
                input_ids.push(next);
                if reached_eos(&self.config, next) {
                    break;
                }
            }

            Ok::<(), ServiceError>(())
        })?;

        Ok(input_ids)
    }
}

/// Chooses the token that follows `history`. `draw` yields a uniform sample
/// and is only called when sampling is enabled.
fn next_token(
    config: &TchGenerationConfig,
    mut scores: Vec<f32>,
    history: &[i64],
    draw: impl FnOnce() -> f32,
) -> Result<i64, ServiceError> {
    sampling::apply_repetition_penalty(&mut scores, history, config.repetition_penalty as f32);

    let picked = if !config.do_sample || config.temperature == 0.0 {
        sampling::argmax(&scores)
    } else {
        let candidates =
            sampling::candidates(&scores, config.temperature, config.top_k, config.top_p);
        sampling::pick(&candidates, draw())
    };
    picked
        .map(|id| id as i64)
        .ok_or_else(|| ServiceError::Generation("model produced empty logits".into()))
}

fn reached_eos(config: &TchGenerationConfig, token: i64) -> bool {
    config.eos_token_id == Some(token)
}

/// Prompt text, untouched, followed by the decoded continuation.
fn render(
    tokenizer: &Tokenizer,
    prompt: &str,
    prompt_ids: &[i64],
    ids: &[i64],
) -> Result<String, ServiceError> {
    let decode = |ids: &[i64]| {
        let ids: Vec<u32> = ids.iter().map(|&id| id as u32).collect();
        tokenizer
            .decode(&ids, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))
    };

    let full = decode(ids)?;
    let prefix = decode(prompt_ids)?;
    let continuation = match full.get(prefix.len()..) {
        Some(rest) if full.starts_with(&prefix) => rest.to_string(),
        _ => decode(ids.get(prompt_ids.len()..).unwrap_or_default())?,
    };
    Ok(format!("{prompt}{continuation}"))
}

fn resolve_device(selection: DeviceSelection) -> Device {
    let cuda = tch::Cuda::is_available();
    match selection {
        DeviceSelection::Cpu => Device::Cpu,
        DeviceSelection::Auto if cuda => Device::Cuda(0),
        DeviceSelection::Auto => Device::Cpu,
        DeviceSelection::Cuda(idx) if cuda => Device::Cuda(idx),
        DeviceSelection::Cuda(idx) => {
            warn!(idx, "CUDA requested but not available, falling back to CPU");
            Device::Cpu
        }
    }
}
