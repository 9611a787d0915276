use tokio::{net::TcpListener, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use text_generation_service::{AppConfig, credentials};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let token = credentials::load_token(&config.secrets_path)?;
    tracing::info!(model = %config.backend.model_id, "loading model artifacts");

    let router = load_router(&config, &token)?;

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(feature = "tch-backend")]
fn load_router(
    config: &AppConfig,
    token: &credentials::HfToken,
) -> anyhow::Result<axum::Router> {
    use text_generation_service::{
        ModelRegistry, StartupError, build_router, model::tch_backend::TchBackend,
    };

    let backend = TchBackend::load(config.backend.clone(), token)?;
    let registry =
        ModelRegistry::initialize(backend, config.generation).map_err(StartupError::from)?;
    Ok(build_router(registry))
}

#[cfg(not(feature = "tch-backend"))]
fn load_router(
    _config: &AppConfig,
    _token: &credentials::HfToken,
) -> anyhow::Result<axum::Router> {
    Err(text_generation_service::StartupError::NoBackend.into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!(%err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
