//! Authentication error types.

use axum::response::{IntoResponse, Response};

use crate::api::ApiError;

/// Why the auth gate turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    InvalidToken,
    UserNotFound,
    DatabaseError,
}

/// Rejection of the `ApiAuth` extractor. Renders the standard failure envelope.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Unauthorized request",
            AuthErrorKind::InvalidToken => "Invalid access token",
            AuthErrorKind::UserNotFound => "Invalid access token",
            AuthErrorKind::DatabaseError => "Database error",
        }
    }
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        match err.kind {
            AuthErrorKind::DatabaseError => ApiError::internal(err.message()),
            _ => ApiError::unauthorized(err.message()),
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
