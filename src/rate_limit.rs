//! Rate limiting for login attempts.
//!
//! Uses a token bucket per login identifier, so guessing passwords for one
//! account is throttled regardless of how many clients take part. The flip
//! side is that anyone can spend an account's quota and hold its owner off
//! for up to a minute; the quota refills on its own and nothing is locked
//! permanently.
//!
//! Keys come from client input. Idle buckets are dropped by
//! `retain_recent`, which the cleanup scheduler runs periodically.

use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

/// Longest identifier kept as a key. Email addresses fit within this.
const MAX_KEY_LEN: usize = 320;

/// Per-key rate limiter.
pub type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-identifier limiter for login
    pub login: Arc<KeyedLimiter>,
}

impl RateLimitConfig {
    /// Allow `login_per_minute` attempts per identifier, bursting up to the same amount.
    pub fn new(login_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(login_per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    /// Record a login attempt for `identifier`. Returns false once the quota is spent.
    pub fn check_login(&self, identifier: &str) -> bool {
        self.login.check_key(&limiter_key(identifier)).is_ok()
    }

    /// Forget identifiers whose bucket has fully refilled. Returns how many were dropped.
    pub fn retain_recent(&self) -> usize {
        let before = self.login.len();
        self.login.retain_recent();
        self.login.shrink_to_fit();
        before.saturating_sub(self.login.len())
    }

    /// Number of identifiers currently tracked.
    pub fn tracked_identifiers(&self) -> usize {
        self.login.len()
    }
}

fn limiter_key(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .take(MAX_KEY_LEN)
        .flat_map(char::to_lowercase)
        .collect()
}
