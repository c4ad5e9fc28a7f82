//! Authentication user types.

use crate::db::User;
use crate::jwt::AccessClaims;

/// The caller behind a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User row as loaded at request time
    pub user: User,
    /// JWT claims from the access token
    pub claims: AccessClaims,
}
