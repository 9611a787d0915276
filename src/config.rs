use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use crate::{error::StartupError, model::GenerationOptions};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_REVISION: &str = "main";
const DEFAULT_MODULE_FILE: &str = "model.ts";
const DEFAULT_MAX_NEW_TOKENS: usize = 256;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub secrets_path: PathBuf,
    pub backend: BackendSettings,
    pub generation: GenerationOptions,
}

/// Everything a backend needs to load its artifacts. Resolved once and handed
/// to the backend by value.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub model_id: String,
    pub revision: String,
    pub tokenizer_path: Option<PathBuf>,
    pub module_path: Option<PathBuf>,
    pub module_file: String,
    pub device: DeviceSelection,
    pub precision: Precision,
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelection {
    Auto,
    Cpu,
    Cuda(usize),
}

impl FromStr for DeviceSelection {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "auto" => Ok(DeviceSelection::Auto),
            "cpu" => Ok(DeviceSelection::Cpu),
            "cuda" => Ok(DeviceSelection::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(DeviceSelection::Cuda)
                .ok_or(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// bf16 on an accelerator, f32 on the CPU.
    Auto,
    BFloat16,
    Float16,
    Float32,
}

impl Precision {
    pub fn resolve(self, accelerated: bool) -> Precision {
        match self {
            Precision::Auto if accelerated => Precision::BFloat16,
            Precision::Auto => Precision::Float32,
            explicit => explicit,
        }
    }
}

impl FromStr for Precision {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "auto" => Ok(Precision::Auto),
            "bf16" | "bfloat16" => Ok(Precision::BFloat16),
            "f16" | "float16" | "half" => Ok(Precision::Float16),
            "f32" | "float32" | "float" => Ok(Precision::Float32),
            _ => Err(()),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = parse_or(
            "SERVER_ADDR",
            get("SERVER_ADDR"),
            DEFAULT_LISTEN_ADDR.parse().ok(),
        )?;

        let model_id = get("MODEL_ID").ok_or(StartupError::MissingSetting("MODEL_ID"))?;
        let secrets_path = get("SECRETS_PATH")
            .map(PathBuf::from)
            .ok_or(StartupError::MissingSetting("SECRETS_PATH"))?;

        let revision = get("MODEL_REVISION").unwrap_or_else(|| DEFAULT_REVISION.to_string());
        let tokenizer_path = get("TOKENIZER_PATH").map(PathBuf::from);
        let module_path = get("MODULE_PATH").map(PathBuf::from);
        let module_file = get("MODULE_FILE").unwrap_or_else(|| DEFAULT_MODULE_FILE.to_string());

        let device = parse_or("DEVICE", get("DEVICE"), Some(DeviceSelection::Auto))?;
        let precision = parse_or("PRECISION", get("PRECISION"), Some(Precision::Auto))?;
        let seed = parse_optional::<u64>("SEED", get("SEED"))?
            .map(|raw| {
                i64::try_from(raw).map_err(|_| StartupError::InvalidSetting {
                    key: "SEED",
                    value: raw.to_string(),
                })
            })
            .transpose()?;

        let max_new_tokens =
            parse_or("MAX_NEW_TOKENS", get("MAX_NEW_TOKENS"), Some(DEFAULT_MAX_NEW_TOKENS))?;

        Ok(Self {
            listen_addr,
            secrets_path,
            backend: BackendSettings {
                model_id,
                revision,
                tokenizer_path,
                module_path,
                module_file,
                device,
                precision,
                seed,
            },
            generation: GenerationOptions { max_new_tokens },
        })
    }
}

fn parse_optional<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, StartupError> {
    raw.map(|value| {
        value
            .trim()
            .parse()
            .map_err(|_| StartupError::InvalidSetting { key, value })
    })
    .transpose()
}

fn parse_or<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: Option<T>,
) -> Result<T, StartupError> {
    parse_optional(key, raw)?
        .or(default)
        .ok_or(StartupError::MissingSetting(key))
}
