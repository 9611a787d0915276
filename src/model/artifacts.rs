use std::path::{Path, PathBuf};

use hf_hub::{Repo, RepoType, api::sync::ApiBuilder};
use tracing::info;

use crate::{config::BackendSettings, credentials::HfToken, error::StartupError};

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Local paths of the files a backend loads.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub tokenizer_path: PathBuf,
    pub module_path: PathBuf,
}

impl ModelArtifacts {
    /// Uses local overrides where configured and fetches the rest from the
    /// hub with `token`.
    pub fn resolve(settings: &BackendSettings, token: &HfToken) -> Result<Self, StartupError> {
        if let (Some(tokenizer_path), Some(module_path)) =
            (&settings.tokenizer_path, &settings.module_path)
        {
            return Ok(Self {
                tokenizer_path: existing(tokenizer_path)?,
                module_path: existing(module_path)?,
            });
        }

        let api = ApiBuilder::new()
            .with_token(Some(token.expose().to_string()))
            .build()
            .map_err(|e| StartupError::ModelLoad(format!("hub client: {e}")))?;
        let repo = api.repo(Repo::with_revision(
            settings.model_id.clone(),
            RepoType::Model,
            settings.revision.clone(),
        ));
        let fetch = |file: &str| {
            info!(model = %settings.model_id, file, "fetching model artifact");
            repo.get(file)
                .map_err(|e| StartupError::ModelLoad(format!("{}/{file}: {e}", settings.model_id)))
        };

        let tokenizer_path = match &settings.tokenizer_path {
            Some(path) => existing(path)?,
            None => fetch(TOKENIZER_FILE)?,
        };
        let module_path = match &settings.module_path {
            Some(path) => existing(path)?,
            None => fetch(settings.module_file.as_str())?,
        };

        Ok(Self {
            tokenizer_path,
            module_path,
        })
    }
}

fn existing(path: &Path) -> Result<PathBuf, StartupError> {
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(StartupError::ModelLoad(format!(
            "model artifact missing: {}",
            path.display()
        )))
    }
}
