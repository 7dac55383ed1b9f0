//! Password hashing with Argon2id.
//!
//! Digests are PHC strings with a random per-call salt; verification is
//! constant-time via the `password_hash` comparison. Hashing happens only
//! where a password is being set or changed, never on unrelated saves.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use secrecy::{ExposeSecret, SecretString};

/// Minimum accepted password length, matching the registration contract.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a plaintext password into a PHC-format digest.
///
/// # Errors
/// Returns an error when hashing fails; callers must abort the surrounding
/// operation (registration or password change).
pub fn hash(plaintext: &SecretString) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Argon2::default()
        .hash_password(plaintext.expose_secret().as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(digest.to_string())
}

/// Verify a plaintext password against a stored PHC digest.
///
/// An unparseable digest verifies as false rather than erroring; a corrupted
/// column must not let a login through.
#[must_use]
pub fn verify(plaintext: &SecretString, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.expose_secret().as_bytes(), &parsed)
        .is_ok()
}
