mod artifacts;
mod backend;
pub mod config;
mod pipeline;
mod registry;
pub mod sampling;
mod types;

#[cfg(feature = "tch-backend")]
pub mod tch_backend;

pub use artifacts::ModelArtifacts;
pub use backend::{GenerationEngine, ModelBackend};
pub use config::ConfigSchema;
pub use pipeline::Pipeline;
pub use registry::ModelRegistry;
pub use types::{
    ConfigApplied, ConfigPatch, ConfigSnapshot, GenerationOptions, GenerationRequest,
    GenerationResponse,
};
