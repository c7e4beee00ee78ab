//! Gateway entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ovp_config::{load_settings, Settings};
use ovp_keys::{CredentialStore, FileKeyRepository, KeyRepository, SqlKeyRepository};
use ovp_server::{create_router, state, AppState};
use ovp_voice::StaticVoiceMap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("GATEWAY_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(e) => {
            eprintln!("warning: failed to load config: {e}. using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);
    state::set_production(settings.environment.is_production());

    tracing::info!(
        environment = ?settings.environment,
        version = env!("CARGO_PKG_VERSION"),
        "starting ovp-gateway"
    );

    let key_repository: Arc<dyn KeyRepository> = build_key_repository(&settings).await?;

    let credentials_path = std::path::Path::new(&settings.persistence.data_dir).join("credentials.json");
    let credential_store = Arc::new(CredentialStore::load(&credentials_path).await?);

    let static_voices = StaticVoiceMap::new();

    let host: std::net::IpAddr = settings.server.host.parse().unwrap_or_else(|e| {
        tracing::warn!(host = %settings.server.host, error = %e, "invalid HOST, falling back to 0.0.0.0");
        std::net::IpAddr::from([0, 0, 0, 0])
    });
    let addr = SocketAddr::from((host, settings.server.port));
    let app_state = AppState::new(settings, key_repository, credential_store, static_voices);
    let _pruner = app_state.rate_limiter.spawn_pruner();
    let app = create_router(app_state.clone());

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.shutdown().await;
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Prefers the relational backend when `DATABASE_URL` is configured and
/// reachable at startup (spec §4.B); falls back to the single-file
/// backend otherwise, logging why.
async fn build_key_repository(settings: &Settings) -> Result<Arc<dyn KeyRepository>, Box<dyn std::error::Error>> {
    if let Some(database_url) = settings.persistence.database_url.as_deref().filter(|u| !u.is_empty()) {
        match SqlKeyRepository::connect(database_url).await {
            Ok(repo) => {
                tracing::info!("using relational key repository");
                return Ok(Arc::new(repo));
            }
            Err(e) => {
                tracing::warn!(error = %e, "DATABASE_URL configured but unreachable, falling back to file backend");
            }
        }
    }

    let keys_path = std::path::Path::new(&settings.persistence.data_dir).join("keys.json");
    let repo = FileKeyRepository::load(&keys_path).await?;
    tracing::info!(path = %keys_path.display(), "using file key repository");
    Ok(Arc::new(repo))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// JSON logs in production/staging (machine-parseable for log
/// aggregation), plain text in development, unless overridden explicitly
/// by `LOG_FORMAT` (SPEC_FULL.md §10.1) — see `Settings::effective_log_format`.
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "ovp_server={0},ovp_voice={0},ovp_providers={0},ovp_keys={0},tower_http=debug",
            settings.log_level
        )
        .into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = match settings.effective_log_format() {
        ovp_config::LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        ovp_config::LogFormat::Plain => tracing_subscriber::fmt::layer().boxed(),
    };
    subscriber.with(fmt_layer).init();
}
