//! Argon2 hashing for `password` fields.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde_json::Value;

use crate::domain::hooks::FieldHook;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hash `plain` into a PHC string.
///
/// # Errors
///
/// [`PasswordError::Hash`] if Argon2 rejects the input.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(PasswordError::Hash)
}

/// `true` if `candidate` matches the stored `hash`. A malformed hash never
/// matches.
#[must_use]
pub fn verify_password(hash: &str, candidate: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    })
}

/// `true` if `value` already parses as a PHC hash string.
#[must_use]
pub fn is_hashed(value: &str) -> bool {
    PasswordHash::new(value).is_ok()
}

/// The built-in `resolveInput` stage of every password field.
///
/// Plain strings are hashed on the blocking pool; hashes, nulls and
/// non-strings pass through untouched.
pub(crate) fn hashing_hook() -> FieldHook {
    FieldHook::resolve_input(|args| async move {
        let plain = match args.value {
            Some(Value::String(plain)) => plain,
            other => return Ok(other),
        };
        if is_hashed(&plain) {
            return Ok(Some(Value::String(plain)));
        }
        let hashed = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(PasswordError::from)??;
        Ok(Some(Value::String(hashed)))
    })
}
