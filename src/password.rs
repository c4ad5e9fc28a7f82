//! Password hashing with Argon2id.
//!
//! Tests build a cheap Argon2 instance; release builds use the crate
//! defaults (19 MiB memory, 2 iterations, 1 lane).

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// A salted Argon2 digest in PHC string format.
///
/// The only constructor hashes a plaintext, so the user store can never be
/// handed a password it would persist as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Hash a plaintext password with a fresh random salt.
    pub fn new(plaintext: &str) -> Result<Self, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        argon2_instance()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| Self(hash.to_string()))
            .map_err(|_| PasswordError::Hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HashedPassword(..)")
    }
}

/// Check a plaintext password against a stored digest.
///
/// A mismatch is `Ok(false)`; only an unreadable digest is an error.
pub fn verify_password(plaintext: &str, digest: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(digest).map_err(|_| PasswordError::InvalidDigest)?;

    Ok(argon2_instance()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok())
}

#[inline]
fn argon2_instance() -> Argon2<'static> {
    #[cfg(test)]
    {
        use argon2::{Algorithm, Params, Version};

        // 1 MiB, 1 iteration. Never used outside unit tests.
        match Params::new(1024, 1, 1, None) {
            Ok(params) => Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            Err(_) => Argon2::default(),
        }
    }

    #[cfg(not(test))]
    {
        Argon2::default()
    }
}

/// Errors from the password hasher.
#[derive(Debug)]
pub enum PasswordError {
    /// Hashing failed (salt or parameter problem)
    Hash,
    /// Stored digest is not a valid PHC string
    InvalidDigest,
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Hash => write!(f, "Failed to hash password"),
            PasswordError::InvalidDigest => write!(f, "Stored password hash is invalid"),
        }
    }
}

impl std::error::Error for PasswordError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = HashedPassword::new("correct horse battery staple").unwrap();
        assert!(hash.as_str().starts_with("$argon2id$"));

        assert!(verify_password("correct horse battery staple", hash.as_str()).unwrap());
        assert!(!verify_password("wrong password", hash.as_str()).unwrap());
    }

    #[test]
    fn test_different_salts_for_same_password() {
        let first = HashedPassword::new("hunter2").unwrap();
        let second = HashedPassword::new("hunter2").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("hunter2", first.as_str()).unwrap());
        assert!(verify_password("hunter2", second.as_str()).unwrap());
    }

    #[test]
    fn test_plaintext_never_stored() {
        let hash = HashedPassword::new("hunter2").unwrap();
        assert!(!hash.as_str().contains("hunter2"));
        assert_eq!(format!("{:?}", hash), "HashedPassword(..)");
    }

    #[test]
    fn test_malformed_digest_is_error() {
        assert!(matches!(
            verify_password("hunter2", "not-a-phc-string"),
            Err(PasswordError::InvalidDigest)
        ));
    }
}
