//! Login, refresh-token rotation, logout and password change.
//!
//! Each user has at most one live refresh token, stored on the user row.
//! Login overwrites it, rotation swaps it atomically, logout clears it.
//! Access tokens are never stored and stay valid until their own expiry.

use tracing::{error, info, warn};

use crate::db::{Database, User};
use crate::jwt::{IssuedToken, JwtConfig};
use crate::password::{HashedPassword, verify_password};

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Login identifier and password, as submitted.
#[derive(Debug, Clone, Copy)]
pub struct LoginInput<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub password: &'a str,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
}

/// Session lifecycle over the user store and the token issuer.
pub struct Sessions<'a> {
    db: &'a Database,
    jwt: &'a JwtConfig,
}

impl<'a> Sessions<'a> {
    pub fn new(db: &'a Database, jwt: &'a JwtConfig) -> Self {
        Self { db, jwt }
    }

    /// Verify credentials and start a new session, replacing any previous one.
    pub async fn login(&self, input: LoginInput<'_>) -> Result<LoginOutcome, SessionError> {
        let username = non_empty(input.username).map(str::to_lowercase);
        let email = non_empty(input.email);

        if username.is_none() && email.is_none() {
            return Err(SessionError::Validation("Username or email is required"));
        }
        if input.password.is_empty() {
            return Err(SessionError::Validation("Password is required"));
        }

        let credentials = self
            .db
            .users()
            .find_credentials(username.as_deref(), email)
            .await
            .map_err(|e| SessionError::store("Failed to look up user", e))?
            .ok_or(SessionError::NotFound("User does not exist"))?;

        let matches = verify_password(input.password, &credentials.password_hash)
            .map_err(|e| SessionError::internal("Failed to verify password", e))?;
        if !matches {
            warn!(user = %credentials.user.uuid, "Login rejected: wrong password");
            return Err(SessionError::Unauthorized("Invalid user credentials"));
        }

        let user = credentials.user;
        let tokens = self.issue_pair(&user)?;
        self.start_session(&user, &tokens).await?;

        info!(user = %user.uuid, "User logged in");
        Ok(LoginOutcome { user, tokens })
    }

    /// Exchange the current refresh token for a brand-new pair.
    ///
    /// The presented token must verify and must equal the stored value; the
    /// swap to the new value only succeeds if nobody rotated in between.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair, SessionError> {
        let presented =
            non_empty(presented).ok_or(SessionError::Unauthorized("Unauthorized request"))?;

        let claims = self.jwt.validate_refresh_token(presented).map_err(|e| {
            info!(error = %e, "Refresh rejected: token did not verify");
            SessionError::Unauthorized("Invalid refresh token")
        })?;

        let user = self
            .db
            .users()
            .get_by_uuid(&claims.sub)
            .await
            .map_err(|e| SessionError::store("Failed to look up user", e))?
            .ok_or(SessionError::Unauthorized("Invalid refresh token"))?;

        let sessions = self.db.sessions();

        let current = sessions
            .compare_current_refresh_token(user.id, presented)
            .await
            .map_err(|e| SessionError::store("Failed to check refresh token", e))?;
        if !current {
            warn!(user = %user.uuid, "Refresh rejected: token is not the current one");
            return Err(SessionError::Unauthorized("Refresh token is expired or used"));
        }

        let tokens = self.issue_pair(&user)?;

        let swapped = sessions
            .rotate_refresh_token(user.id, presented, &tokens.refresh.token)
            .await
            .map_err(|e| SessionError::store("Failed to rotate refresh token", e))?;
        if !swapped {
            warn!(user = %user.uuid, "Refresh rejected: concurrent rotation won");
            return Err(SessionError::Unauthorized("Refresh token is expired or used"));
        }

        info!(user = %user.uuid, "Refresh token rotated");
        Ok(tokens)
    }

    /// End the user's session. Safe to call when already logged out.
    pub async fn logout(&self, user: &User) -> Result<(), SessionError> {
        self.db
            .sessions()
            .clear_current_refresh_token(user.id)
            .await
            .map_err(|e| SessionError::store("Failed to clear refresh token", e))?;

        info!(user = %user.uuid, "User logged out");
        Ok(())
    }

    /// Replace the password after re-checking the current one.
    /// The stored refresh token is left untouched.
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(SessionError::Validation(
                "Old password and new password are required",
            ));
        }

        let users = self.db.users();

        let digest = users
            .password_hash(user.id)
            .await
            .map_err(|e| SessionError::store("Failed to load password", e))?
            .ok_or(SessionError::NotFound("User does not exist"))?;

        let matches = verify_password(current_password, &digest)
            .map_err(|e| SessionError::internal("Failed to verify password", e))?;
        if !matches {
            warn!(user = %user.uuid, "Password change rejected: wrong current password");
            return Err(SessionError::Unauthorized("Invalid old password"));
        }

        let hashed = HashedPassword::new(new_password)
            .map_err(|e| SessionError::internal("Failed to hash password", e))?;

        users
            .set_password(user.id, &hashed)
            .await
            .map_err(|e| SessionError::store("Failed to update password", e))?;

        info!(user = %user.uuid, "Password changed");
        Ok(())
    }

    /// Make `tokens.refresh` the user's current refresh token.
    async fn start_session(&self, user: &User, tokens: &TokenPair) -> Result<(), SessionError> {
        let stored = self
            .db
            .sessions()
            .set_current_refresh_token(user.id, &tokens.refresh.token)
            .await
            .map_err(|e| SessionError::store("Failed to store refresh token", e))?;

        // The row can disappear between the credential check and this write
        if !stored {
            warn!(user = %user.uuid, "Login rejected: user deleted during login");
            return Err(SessionError::NotFound("User does not exist"));
        }
        Ok(())
    }

    fn issue_pair(&self, user: &User) -> Result<TokenPair, SessionError> {
        let access = self
            .jwt
            .generate_access_token(&user.uuid, &user.username, &user.email)
            .map_err(|e| SessionError::internal("Failed to generate access token", e))?;
        let refresh = self
            .jwt
            .generate_refresh_token(&user.uuid)
            .map_err(|e| SessionError::internal("Failed to generate refresh token", e))?;

        Ok(TokenPair { access, refresh })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Failures of the session lifecycle. Every variant is terminal for the
/// request; none is retried server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Missing or empty required field
    Validation(&'static str),
    /// Missing, invalid, expired or superseded credential
    Unauthorized(&'static str),
    /// Referenced user does not exist
    NotFound(&'static str),
    /// Store or issuance failure; the detail has already been logged
    Internal(&'static str),
}

impl SessionError {
    fn store(context: &'static str, e: sqlx::Error) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Database error")
    }

    fn internal(context: &'static str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal(context)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::NotFound(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::jwt::{DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_REFRESH_TOKEN_TTL, JwtSettings};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn jwt() -> JwtConfig {
        JwtConfig::new(&JwtSettings {
            access_secret: b"access-secret-key-for-session-tests".to_vec(),
            refresh_secret: b"refresh-secret-key-for-session-tests".to_vec(),
            access_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_ttl: DEFAULT_REFRESH_TOKEN_TTL,
        })
    }

    async fn setup() -> (Database, JwtConfig, User) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .users()
            .create(
                "uuid-alice",
                &NewUser {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    full_name: "Alice Liddell".to_string(),
                    avatar: String::new(),
                    cover_image: String::new(),
                    password: HashedPassword::new("wonderland").unwrap(),
                },
            )
            .await
            .unwrap();
        (db, jwt(), user)
    }

    fn by_username<'a>(username: &'a str, password: &'a str) -> LoginInput<'a> {
        LoginInput {
            username: Some(username),
            email: None,
            password,
        }
    }

    #[tokio::test]
    async fn test_login_returns_tokens_for_user() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let outcome = sessions
            .login(by_username("alice", "wonderland"))
            .await
            .unwrap();
        assert_eq!(outcome.user.id, user.id);

        let claims = jwt.validate_access_token(&outcome.tokens.access.token).unwrap();
        assert_eq!(claims.sub, user.uuid);

        assert!(
            db.sessions()
                .compare_current_refresh_token(user.id, &outcome.tokens.refresh.token)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_login_by_email_and_mixed_case_username() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let by_email = sessions
            .login(LoginInput {
                username: None,
                email: Some("alice@example.com"),
                password: "wonderland",
            })
            .await
            .unwrap();
        assert_eq!(by_email.user.id, user.id);

        let shouted = sessions
            .login(by_username("  ALICE ", "wonderland"))
            .await
            .unwrap();
        assert_eq!(shouted.user.id, user.id);
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let (db, jwt, _) = setup().await;
        let result = Sessions::new(&db, &jwt)
            .login(by_username("bob", "wonderland"))
            .await;

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (db, jwt, user) = setup().await;
        let result = Sessions::new(&db, &jwt)
            .login(by_username("alice", "looking-glass"))
            .await;

        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
        assert!(!db.sessions().compare_current_refresh_token(user.id, "").await.unwrap());
    }

    #[tokio::test]
    async fn test_login_requires_identifier_and_password() {
        let (db, jwt, _) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let no_identifier = sessions
            .login(LoginInput {
                username: Some("   "),
                email: None,
                password: "wonderland",
            })
            .await;
        assert!(matches!(no_identifier, Err(SessionError::Validation(_))));

        let no_password = sessions.login(by_username("alice", "")).await;
        assert!(matches!(no_password, Err(SessionError::Validation(_))));
    }

    #[tokio::test]
    async fn test_second_login_supersedes_first() {
        let (db, jwt, _) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let first = sessions.login(by_username("alice", "wonderland")).await.unwrap();
        let second = sessions.login(by_username("alice", "wonderland")).await.unwrap();

        let stale = sessions.refresh(Some(&first.tokens.refresh.token)).await;
        assert!(matches!(stale, Err(SessionError::Unauthorized(_))));

        assert!(sessions.refresh(Some(&second.tokens.refresh.token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_reuse() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let login = sessions.login(by_username("alice", "wonderland")).await.unwrap();
        let original = login.tokens.refresh.token;

        let rotated = sessions.refresh(Some(&original)).await.unwrap();
        assert_ne!(rotated.refresh.token, original);

        let claims = jwt.validate_access_token(&rotated.access.token).unwrap();
        assert_eq!(claims.sub, user.uuid);

        // The original still verifies cryptographically but is no longer current
        assert!(jwt.validate_refresh_token(&original).is_ok());
        let reused = sessions.refresh(Some(&original)).await;
        assert_eq!(
            reused.unwrap_err(),
            SessionError::Unauthorized("Refresh token is expired or used")
        );

        assert!(sessions.refresh(Some(&rotated.refresh.token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_fails_if_user_vanishes_before_session_stored() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let tokens = sessions.issue_pair(&user).unwrap();
        assert!(db.users().delete(user.id).await.unwrap());

        assert_eq!(
            sessions.start_session(&user, &tokens).await,
            Err(SessionError::NotFound("User does not exist"))
        );
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let login = sessions.login(by_username("alice", "wonderland")).await.unwrap();
        let token = login.tokens.refresh.token;

        let (first, second) = tokio::join!(
            sessions.refresh(Some(&token)),
            sessions.refresh(Some(&token))
        );

        let winners: Vec<TokenPair> = [first, second].into_iter().filter_map(Result::ok).collect();
        assert_eq!(winners.len(), 1);

        // Only the winner's token is current afterwards
        assert!(
            db.sessions()
                .compare_current_refresh_token(user.id, &winners[0].refresh.token)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_refresh_without_token() {
        let (db, jwt, _) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        assert!(matches!(
            sessions.refresh(None).await,
            Err(SessionError::Unauthorized(_))
        ));
        assert!(matches!(
            sessions.refresh(Some("")).await,
            Err(SessionError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_with_garbage_token() {
        let (db, jwt, _) = setup().await;
        let result = Sessions::new(&db, &jwt).refresh(Some("not-a-jwt")).await;

        assert_eq!(
            result.unwrap_err(),
            SessionError::Unauthorized("Invalid refresh token")
        );
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let (db, jwt, _) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let login = sessions.login(by_username("alice", "wonderland")).await.unwrap();
        let result = sessions.refresh(Some(&login.tokens.access.token)).await;

        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_expired_refresh_rejected_even_if_stored() {
        let (db, jwt, user) = setup().await;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let expired = jwt
            .generate_refresh_token_at(&user.uuid, now - DEFAULT_REFRESH_TOKEN_TTL.as_secs() - 60)
            .unwrap();
        db.sessions()
            .set_current_refresh_token(user.id, &expired.token)
            .await
            .unwrap();

        let result = Sessions::new(&db, &jwt).refresh(Some(&expired.token)).await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::Unauthorized("Invalid refresh token")
        );
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_user() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let login = sessions.login(by_username("alice", "wonderland")).await.unwrap();
        db.users().delete(user.id).await.unwrap();

        let result = sessions.refresh(Some(&login.tokens.refresh.token)).await;
        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_logout_twice_is_safe() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let login = sessions.login(by_username("alice", "wonderland")).await.unwrap();

        sessions.logout(&user).await.unwrap();
        sessions.logout(&user).await.unwrap();

        let result = sessions.refresh(Some(&login.tokens.refresh.token)).await;
        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        sessions
            .change_password(&user, "wonderland", "looking-glass")
            .await
            .unwrap();

        assert!(sessions.login(by_username("alice", "wonderland")).await.is_err());
        assert!(sessions.login(by_username("alice", "looking-glass")).await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_wrong_current_leaves_hash() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);
        let before = db.users().password_hash(user.id).await.unwrap();

        let result = sessions
            .change_password(&user, "not-my-password", "looking-glass")
            .await;
        assert_eq!(
            result.unwrap_err(),
            SessionError::Unauthorized("Invalid old password")
        );

        let after = db.users().password_hash(user.id).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_change_password_keeps_session() {
        let (db, jwt, user) = setup().await;
        let sessions = Sessions::new(&db, &jwt);

        let login = sessions.login(by_username("alice", "wonderland")).await.unwrap();
        sessions
            .change_password(&user, "wonderland", "looking-glass")
            .await
            .unwrap();

        assert!(sessions.refresh(Some(&login.tokens.refresh.token)).await.is_ok());
    }
}
