use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use server::config::{feature_flags, load_feature_flags, GatewayConfig};
use server::db::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    load_feature_flags();
    let flags = feature_flags();
    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;

    if flags.telemetry {
        server::telemetry::init_telemetry().context("failed to initialize telemetry")?;
    }
    server::health::record_start_time();

    let pool = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).context("invalid DATABASE_URL")?;
            db::run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;
            Some(pool)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory user directory");
            None
        }
    };

    let port = config.port;
    tracing::info!(
        app = %config.app_name,
        port,
        auth_enabled = config.auth.enabled,
        services = ?config.services.iter().filter(|s| s.enabled).map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "Auth gateway starting"
    );

    let router = server::router::api_router(AppState::new(config, pool));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    tracing::info!(port, "Auth gateway running");
    axum::serve(listener, router).await?;
    Ok(())
}
