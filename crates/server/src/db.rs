use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::auth::jwt::TokenVerifier;
use crate::auth::oauth_state::OAuthStateStore;
use crate::config::GatewayConfig;
use crate::directory::{Directory, InMemoryDirectory, PgDirectory};
use crate::security::ClaimsSecurityManager;

/// Shared application state passed to Axum handlers via `State`.
/// Derives `FromRef` so handlers can extract `State<Arc<GatewayConfig>>` directly.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<TokenVerifier>,
    pub security: Arc<ClaimsSecurityManager>,
    pub directory: Directory,
    pub oauth_states: Arc<OAuthStateStore>,
    pub pool: Option<Pool<Postgres>>,
}

impl AppState {
    /// Wire the state from a loaded config. The Postgres directory is used
    /// when a pool is given, the in-memory one otherwise.
    pub fn new(config: GatewayConfig, pool: Option<Pool<Postgres>>) -> Self {
        let verifier = TokenVerifier::from_config(&config.oidc);
        let security = ClaimsSecurityManager::from_config(&config.resolver, &config.oidc);
        let directory = match &pool {
            Some(pool) => Directory::Postgres(PgDirectory::new(pool.clone())),
            None => Directory::Memory(InMemoryDirectory::seeded()),
        };

        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            security: Arc::new(security),
            directory,
            oauth_states: Arc::new(OAuthStateStore::default()),
            pool,
        }
    }
}

/// Create a database connection pool for `database_url`.
/// Uses `connect_lazy` so no connections open until the first query.
pub fn create_pool(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    let max_connections: u32 = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect_lazy(database_url)
}

/// Run database migrations against the given pool.
pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
