pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::{ApiError, create_api_router};
use axum::Router;
use db::Database;
use jwt::{JwtConfig, JwtSettings};
use rate_limit::RateLimitConfig;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signing secrets and lifetimes for access and refresh tokens
    pub jwt: JwtSettings,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Login attempts allowed per identifier per minute
    pub login_attempts_per_minute: u32,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let rate_limit = Arc::new(RateLimitConfig::new(config.login_attempts_per_minute));
    build_router(config, rate_limit)
}

fn build_router(config: &ServerConfig, rate_limit: Arc<RateLimitConfig>) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.jwt));

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        config.secure_cookies,
        rate_limit,
    );

    Router::new()
        .nest("/api/v1", api_router)
        .fallback(|| async { ApiError::not_found("Route not found") })
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Also starts the background cleanup of idle rate limiter entries.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let rate_limit = Arc::new(RateLimitConfig::new(config.login_attempts_per_minute));
    cleanup::spawn_cleanup_scheduler(rate_limit.clone());

    let app = build_router(&config, rate_limit);
    axum::serve(listener, app).await
}
