use crate::{
    ai::init_model_registry,
    config::Settings,
    ctx::Ctx,
    routes::get_routes,
};
use anyhow::Context;
use history_db::HistoryDb;
use std::path::Path;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub const SERVICE_NAME: &str = "caption-service";

pub async fn start_server(config_path: impl AsRef<Path>) -> anyhow::Result<()> {
    let config_path = config_path.as_ref();

    // environment overrides in .env must be visible to the settings loader
    let _ = dotenvy::dotenv();
    let settings = Settings::load(config_path)
        .with_context(|| format!("failed to load settings from {}", config_path.display()))?;

    match &settings.server.log_dir {
        Some(log_dir) => analytics_tracing::init_tracing_to_file(SERVICE_NAME, log_dir),
        None => analytics_tracing::init_tracing_to_stdout(SERVICE_NAME),
    }

    if !config_path.exists() {
        tracing::warn!(
            "config file {} not found, using defaults and environment",
            config_path.display()
        );
    }

    let database_url = settings.postgres.url();
    HistoryDb::ensure_database(&database_url)
        .await
        .context("failed to create history database")?;
    let history = HistoryDb::connect(&database_url, settings.postgres.max_connections)
        .await
        .context("failed to connect to history database")?;
    history
        .ensure_schema()
        .await
        .context("failed to create history schema")?;

    let registry = init_model_registry(&settings.models.resources_dir).await?;
    if !registry.contains(&settings.models.default_model) {
        tracing::warn!(
            "default model {} is not loaded, requests without model_name will be rejected",
            settings.models.default_model
        );
    }

    let addr = (settings.server.host.clone(), settings.server.port);
    let mode = settings.server.mode;
    let ctx = Ctx::new(registry, history, settings);

    let app = get_routes(ctx)
        .layer(TraceLayer::new_for_http())
        .layer({
            let cors = CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(Any);
            cors
        });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;
    tracing::info!(
        "listening on http://{} ({:?} mode)",
        listener.local_addr()?,
        mode
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl-C received, shut down...");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, shut down...");
        },
    }
}
