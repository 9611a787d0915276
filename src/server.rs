use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    error::ServiceError,
    model::{
        ConfigApplied, ConfigPatch, ConfigSnapshot, GenerationRequest, GenerationResponse,
        ModelBackend, ModelRegistry,
    },
};

pub struct AppState<B: ModelBackend> {
    pub registry: ModelRegistry<B>,
}

impl<B: ModelBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

pub fn build_router<B: ModelBackend>(registry: ModelRegistry<B>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate::<B>))
        .route("/change_config", post(change_config::<B>))
        .route("/config", get(current_config::<B>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn generate<B: ModelBackend>(
    State(state): State<AppState<B>>,
    body: Bytes,
) -> Result<Json<GenerationResponse>, ServiceError> {
    let request = GenerationRequest::from_body(&body)?;
    let response = state.registry.generate(request).await?;
    Ok(Json(response))
}

async fn change_config<B: ModelBackend>(
    State(state): State<AppState<B>>,
    body: Bytes,
) -> Result<Json<ConfigApplied>, ServiceError> {
    let patch = ConfigPatch::from_body(&body)?;
    info!(keys = ?patch.keys(), "changing configuration");
    state.registry.change_config(patch).await?;
    Ok(Json(ConfigApplied::default()))
}

async fn current_config<B: ModelBackend>(
    State(state): State<AppState<B>>,
) -> Json<ConfigSnapshot> {
    Json(state.registry.snapshot())
}
