use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Per-request failures. Every variant is rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("model execution failed: {0}")]
    Generation(String),
    #[error("Invalid config key: {0}")]
    InvalidConfigKey(String),
    #[error("Invalid value for config key {key}: {reason}")]
    ConfigApply { key: String, reason: String },
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("pipeline rebuild failed: {0}")]
    Rebuild(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest(_)
            | ServiceError::InvalidConfigKey(_)
            | ServiceError::ConfigApply { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Generation(_)
            | ServiceError::Tokenizer(_)
            | ServiceError::Rebuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Conditions that prevent the service from ever accepting traffic.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required setting {0} is not set")]
    MissingSetting(&'static str),
    #[error("invalid value for {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },
    #[error("credentials: {0}")]
    Credentials(String),
    #[error("error loading the model: {0}")]
    ModelLoad(String),
    #[error("no model backend compiled in; enable the `tch-backend` feature")]
    NoBackend,
}

impl From<ServiceError> for StartupError {
    fn from(err: ServiceError) -> Self {
        StartupError::ModelLoad(err.to_string())
    }
}
