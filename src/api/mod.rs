mod error;
mod response;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ResultExt};
pub use response::{ApiJson, ApiResponse};
pub use users::UsersState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    secure_cookies: bool,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let users_state = users::UsersState {
        db,
        jwt,
        secure_cookies,
        rate_limit,
    };

    Router::new().nest("/users", users::router(users_state))
}
