//! User account and session endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Verify credentials, issue a token pair
//! - POST `/logout` - Clear the stored refresh token and both cookies
//! - POST `/refresh-token` - Rotate the refresh token, issue a new pair
//! - POST `/change-password` - Replace the password after re-checking it
//! - GET `/current-user` - The authenticated user

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use super::response::{ApiJson, ApiResponse};
use crate::auth::{
    ACCESS_COOKIE_NAME, ApiAuth, CredentialSource, REFRESH_COOKIE_NAME, clear_cookie,
    find_credential, token_cookie,
};
use crate::db::{Database, NewUser, User, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::password::HashedPassword;
use crate::rate_limit::RateLimitConfig;
use crate::session::{LoginInput, Sessions, TokenPair};

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub secure_cookies: bool,
    pub rate_limit: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .with_state(state)
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RegisterRequest {
    username: String,
    email: String,
    full_name: String,
    password: String,
    avatar: String,
    cover_image: String,
}

async fn register(
    State(state): State<UsersState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim().to_lowercase();
    let email = payload.email.trim();
    let full_name = payload.full_name.trim();

    if [username.as_str(), email, full_name, payload.password.as_str()]
        .iter()
        .any(|field| field.is_empty())
    {
        return Err(ApiError::bad_request("Required fields are missing"));
    }

    if username.len() > 32 {
        return Err(ApiError::bad_request(
            "Username cannot be longer than 32 characters",
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    if !is_plausible_email(email) {
        return Err(ApiError::bad_request("Email address is invalid"));
    }

    let taken = state
        .db
        .users()
        .exists_by_username_or_email(&username, email)
        .await
        .db_err("Failed to check username availability")?;

    if taken {
        return Err(ApiError::conflict("Username or email already exists"));
    }

    let password = HashedPassword::new(&payload.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Something went wrong while registering the user")
    })?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let user = state
        .db
        .users()
        .create(
            &uuid,
            &NewUser {
                username,
                email: email.to_string(),
                full_name: full_name.to_string(),
                avatar: payload.avatar.trim().to_string(),
                cover_image: payload.cover_image.trim().to_string(),
                password,
            },
        )
        .await
        .map_err(create_user_error)?;

    info!(user = %user.uuid, username = %user.username, "User registered");

    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

/// The existence check and the insert are separate statements, so a
/// concurrent registration can still win the UNIQUE index.
fn create_user_error(err: sqlx::Error) -> ApiError {
    if is_unique_violation(&err) {
        warn!("Registration lost a race for a username or email");
        ApiError::conflict("Username or email already exists")
    } else {
        ApiError::db_error("Failed to create user", err)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LoginRequest {
    username: Option<String>,
    email: Option<String>,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    user: User,
    access_token: String,
    refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    access_token: String,
    refresh_token: String,
}

/// `Set-Cookie` headers for a freshly issued pair.
fn pair_cookies(tokens: &TokenPair, secure: bool) -> AppendHeaders<[(HeaderName, String); 2]> {
    AppendHeaders([
        (
            SET_COOKIE,
            token_cookie(
                ACCESS_COOKIE_NAME,
                &tokens.access.token,
                tokens.access.duration,
                secure,
            ),
        ),
        (
            SET_COOKIE,
            token_cookie(
                REFRESH_COOKIE_NAME,
                &tokens.refresh.token,
                tokens.refresh.duration,
                secure,
            ),
        ),
    ])
}

async fn login(
    State(state): State<UsersState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = payload
        .username
        .as_deref()
        .or(payload.email.as_deref())
        .unwrap_or_default();

    if !state.rate_limit.check_login(identifier) {
        warn!(identifier = %identifier, "Login rate limit exceeded");
        return Err(ApiError::too_many_requests(
            "Too many login attempts. Please wait before trying again.",
        ));
    }

    let outcome = Sessions::new(&state.db, &state.jwt)
        .login(LoginInput {
            username: payload.username.as_deref(),
            email: payload.email.as_deref(),
            password: &payload.password,
        })
        .await?;

    let cookies = pair_cookies(&outcome.tokens, state.secure_cookies);

    Ok((
        cookies,
        ApiResponse::ok(
            LoginData {
                user: outcome.user,
                access_token: outcome.tokens.access.token,
                refresh_token: outcome.tokens.refresh.token,
            },
            "User logged in successfully",
        ),
    ))
}

async fn logout(
    State(state): State<UsersState>,
    ApiAuth(auth): ApiAuth,
) -> Result<impl IntoResponse, ApiError> {
    Sessions::new(&state.db, &state.jwt)
        .logout(&auth.user)
        .await?;

    Ok((
        AppendHeaders([
            (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies)),
            (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies)),
        ]),
        ApiResponse::ok(serde_json::json!({}), "User logged out"),
    ))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

/// Rotate the refresh token. The token is taken from the `refreshToken`
/// cookie, or else from an optional JSON body field of the same name.
async fn refresh_token(
    State(state): State<UsersState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let cookie_present =
        find_credential(&headers, &[CredentialSource::Cookie(REFRESH_COOKIE_NAME)]).is_some();

    // The cookie wins, so the body only matters without one
    let payload: RefreshRequest = if cookie_present || body.iter().all(u8::is_ascii_whitespace) {
        RefreshRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?
    };

    let sources = [
        CredentialSource::Cookie(REFRESH_COOKIE_NAME),
        CredentialSource::Provided(payload.refresh_token.as_deref()),
    ];
    let presented = find_credential(&headers, &sources);

    let tokens = Sessions::new(&state.db, &state.jwt)
        .refresh(presented)
        .await?;

    let cookies = pair_cookies(&tokens, state.secure_cookies);

    Ok((
        cookies,
        ApiResponse::ok(
            TokenData {
                access_token: tokens.access.token,
                refresh_token: tokens.refresh.token,
            },
            "Access token refreshed",
        ),
    ))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<UsersState>,
    ApiAuth(auth): ApiAuth,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Sessions::new(&state.db, &state.jwt)
        .change_password(&auth.user, &payload.old_password, &payload.new_password)
        .await?;

    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    ))
}

async fn current_user(ApiAuth(auth): ApiAuth) -> impl IntoResponse {
    ApiResponse::ok(auth.user, "Current user fetched successfully")
}
