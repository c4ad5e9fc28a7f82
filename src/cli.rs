//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::JwtSettings;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;

const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chirptube",
    about = "Content platform backend with access/refresh token sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "chirptube.db")]
    pub database: String,

    /// Access token lifetime, e.g. "15m", "1h", "1d" or plain seconds
    #[arg(long, env = "ACCESS_TOKEN_EXPIRY", default_value = "15m", value_parser = parse_duration)]
    pub access_token_expiry: Duration,

    /// Refresh token lifetime, e.g. "10d"
    #[arg(long, env = "REFRESH_TOKEN_EXPIRY", default_value = "10d", value_parser = parse_duration)]
    pub refresh_token_expiry: Duration,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET instead
    #[arg(long)]
    pub access_token_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET instead
    #[arg(long)]
    pub refresh_token_secret_file: Option<String>,

    /// Do not set the Secure flag on cookies (local HTTP development only)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Login attempts allowed per username/email per minute
    #[arg(long, default_value = "10")]
    pub login_attempts_per_minute: u32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Parse a lifetime such as "30s", "15m", "2h", "10d" or "3600".
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 60 * 60),
        Some((i, 'd')) => (&s[..i], 24 * 60 * 60),
        Some(_) => (s, 1),
        None => return Err("Duration cannot be empty".to_string()),
    };

    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;

    if amount == 0 {
        return Err(format!("Duration must be greater than zero: {}", s));
    }

    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration is too large: {}", s))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// The two signing secrets, loaded and checked.
pub struct TokenSecrets {
    pub access: Vec<u8>,
    pub refresh: Vec<u8>,
}

/// Load a secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            variable = %env_var,
            "Token secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            variable = %env_var,
            "Token secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets. They must be present, long enough, and different.
pub fn load_secrets(
    access_secret_file: Option<&str>,
    refresh_secret_file: Option<&str>,
) -> Option<TokenSecrets> {
    let access = load_secret(ACCESS_SECRET_ENV, access_secret_file)?;
    let refresh = load_secret(REFRESH_SECRET_ENV, refresh_secret_file)?;

    if access == refresh {
        error!("Access and refresh token secrets must be different");
        return None;
    }

    Some(TokenSecrets {
        access: access.into_bytes(),
        refresh: refresh.into_bytes(),
    })
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, secrets: TokenSecrets) -> ServerConfig {
    ServerConfig {
        db,
        jwt: JwtSettings {
            access_secret: secrets.access,
            refresh_secret: secrets.refresh,
            access_ttl: args.access_token_expiry,
            refresh_ttl: args.refresh_token_expiry,
        },
        secure_cookies: !args.insecure_cookies,
        login_attempts_per_minute: args.login_attempts_per_minute,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
