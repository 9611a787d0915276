use std::{fmt, fs, io, path::Path};

use crate::error::StartupError;

/// Hub access token for gated models.
#[derive(Clone)]
pub struct HfToken(String);

impl HfToken {
    pub fn new(token: impl Into<String>) -> Result<Self, StartupError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(StartupError::Credentials(
                "there is no huggingface token in the secrets".into(),
            ));
        }
        Ok(Self(token))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HfToken(***)")
    }
}

/// Reads `{"hf_token": "..."}` from a JSON secrets file.
pub fn load_token(path: &Path) -> Result<HfToken, StartupError> {
    let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => StartupError::Credentials(format!(
            "secrets file not found at {}",
            path.display()
        )),
        _ => StartupError::Credentials(format!("cannot read {}: {err}", path.display())),
    })?;

    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
        StartupError::Credentials(format!("secrets file is not valid JSON: {err}"))
    })?;

    let token = value
        .get("hf_token")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    HfToken::new(token)
}
