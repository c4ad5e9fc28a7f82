//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, error};

use super::credential::{ACCESS_TOKEN_SOURCES, find_credential};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Verify the access token on a request and load its user. Read-only.
async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = find_credential(&parts.headers, &ACCESS_TOKEN_SOURCES)
        .ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = state.jwt().validate_access_token(token).map_err(|e| {
        debug!(error = %e, "Access token rejected");
        AuthErrorKind::InvalidToken
    })?;

    // The user may have been deleted after the token was issued
    let user = state
        .db()
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .map_err(|e| {
            error!("Failed to get user: {}", e);
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::UserNotFound)?;

    Ok(AuthenticatedUser { user, claims })
}

/// Extractor for API endpoints that require authentication.
/// Accepts the `accessToken` cookie or an `Authorization: Bearer` header.
pub struct ApiAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for ApiAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state)
            .await
            .map(ApiAuth)
            .map_err(ApiAuthError::new)
    }
}
