use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::ApiError;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Server-side strength rule, applied everywhere a password is set: at
/// least 8 characters with an uppercase letter, a lowercase letter and a
/// digit.
pub fn check_strength(plain: &str) -> Result<(), ApiError> {
    let long_enough = plain.chars().count() >= 8;
    let has_upper = plain.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = plain.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = plain.chars().any(|c| c.is_ascii_digit());
    if long_enough && has_upper && has_lower && has_digit {
        Ok(())
    } else {
        Err(ApiError::weak_password(
            "La contraseña debe tener al menos 8 caracteres e incluir mayúsculas, minúsculas y números",
        ))
    }
}
