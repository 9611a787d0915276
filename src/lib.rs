pub mod config;
pub mod credentials;
pub mod error;
pub mod model;
pub mod server;

pub use config::{AppConfig, BackendSettings};
pub use error::{ServiceError, StartupError};
pub use model::{
    ConfigPatch, ConfigSchema, GenerationEngine, GenerationOptions, GenerationRequest,
    GenerationResponse, ModelBackend, ModelRegistry, Pipeline,
};
pub use server::build_router;
