use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task;
use tracing::{debug, info};

use crate::{
    error::ServiceError,
    model::{
        ConfigPatch, ConfigSnapshot, GenerationOptions, GenerationRequest, GenerationResponse,
        ModelBackend, Pipeline,
    },
};

/// Owns the backend and the single active [`Pipeline`].
///
/// Readers clone the `Arc` under a short read lock and run generation without
/// holding it. Writers serialize on `writer`, build the replacement off to the
/// side and swap it in with one write, so a request sees either the old
/// pipeline or the new one and never a mix.
pub struct ModelRegistry<B: ModelBackend> {
    backend: Arc<B>,
    active: Arc<RwLock<Arc<Pipeline<B>>>>,
    writer: Arc<Mutex<()>>,
    options: GenerationOptions,
}

impl<B: ModelBackend> Clone for ModelRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            active: self.active.clone(),
            writer: self.writer.clone(),
            options: self.options,
        }
    }
}

impl<B: ModelBackend> ModelRegistry<B> {
    pub fn initialize(backend: B, options: GenerationOptions) -> Result<Self, ServiceError> {
        let config = backend.initial_config();
        let pipeline = Pipeline::build(&backend, config, 0)?;
        info!(model = backend.model_id(), "generation pipeline ready");

        Ok(Self {
            backend: Arc::new(backend),
            active: Arc::new(RwLock::new(Arc::new(pipeline))),
            writer: Arc::new(Mutex::new(())),
            options,
        })
    }

    pub fn options(&self) -> GenerationOptions {
        self.options
    }

    pub fn current(&self) -> Arc<Pipeline<B>> {
        self.active.read().clone()
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        let pipeline = self.current();
        ConfigSnapshot {
            version: pipeline.version(),
            model_id: self.backend.model_id().to_string(),
            config: self.backend.schema().snapshot(pipeline.config()),
        }
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        let pipeline = self.current();
        let options = self.options;
        let prompt = request.prompt;
        debug!(
            version = pipeline.version(),
            prompt_len = prompt.len(),
            "running generation"
        );

        let generated_text =
            task::spawn_blocking(move || pipeline.generate(&prompt, &options))
                .await
                .map_err(|err| ServiceError::Generation(format!("inference task failed: {err}")))??;

        Ok(GenerationResponse { generated_text })
    }

    pub async fn change_config(&self, patch: ConfigPatch) -> Result<u64, ServiceError> {
        let registry = self.clone();
        task::spawn_blocking(move || registry.apply_patch(&patch))
            .await
            .map_err(|err| ServiceError::Rebuild(format!("rebuild task failed: {err}")))?
    }

    /// Validates `patch` against a copy of the committed config, rebuilds and
    /// installs the new pipeline. Returns the installed version.
    pub fn apply_patch(&self, patch: &ConfigPatch) -> Result<u64, ServiceError> {
        let _writer = self.writer.lock();
        let current = self.current();

        let config = self.backend.schema().apply(current.config(), patch)?;
        let version = current.version() + 1;
        let pipeline = Pipeline::build(self.backend.as_ref(), config, version)?;

        *self.active.write() = Arc::new(pipeline);
        info!(version, keys = ?patch.keys(), "applied configuration");
        Ok(version)
    }
}
