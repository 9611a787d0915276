use crate::{
    error::ServiceError,
    model::{ConfigSchema, GenerationOptions},
};

/// A loaded model plus tokenizer that can bind a configuration snapshot into
/// a runnable generation engine.
pub trait ModelBackend: Send + Sync + 'static {
    type Config: Clone + Send + Sync + 'static;
    type Engine: GenerationEngine;

    fn model_id(&self) -> &str;

    /// Fields callers may change at runtime.
    fn schema(&self) -> &ConfigSchema<Self::Config>;

    /// Configuration in effect right after loading.
    fn initial_config(&self) -> Self::Config;

    /// Builds an engine that reads `config` only here, never afterwards.
    fn build_pipeline(&self, config: &Self::Config) -> Result<Self::Engine, ServiceError>;
}

pub trait GenerationEngine: Send + Sync + 'static {
    /// Returns a single text that starts with the prompt it continues.
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ServiceError>;
}
