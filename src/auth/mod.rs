//! Access-token authentication for protected routes.
//!
//! The gate only verifies the access token and loads the user. Expired
//! access tokens are not refreshed here; clients call the refresh endpoint.

mod cookie;
mod credential;
mod errors;
mod extractors;
mod state;
mod types;

pub use cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie, get_cookie, token_cookie};
pub use credential::{ACCESS_TOKEN_SOURCES, CredentialSource, find_credential};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::ApiAuth;
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
