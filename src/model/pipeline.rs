use crate::{
    error::ServiceError,
    model::{GenerationEngine, GenerationOptions, ModelBackend},
};

/// An engine together with the configuration it was built from.
pub struct Pipeline<B: ModelBackend> {
    version: u64,
    config: B::Config,
    engine: B::Engine,
}

impl<B: ModelBackend> Pipeline<B> {
    pub fn build(backend: &B, config: B::Config, version: u64) -> Result<Self, ServiceError> {
        let engine = backend.build_pipeline(&config)?;
        Ok(Self {
            version,
            config,
            engine,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &B::Config {
        &self.config
    }

    pub fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ServiceError> {
        self.engine.generate(prompt, options)
    }
}
