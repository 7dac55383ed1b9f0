//! TOTP engine: secret generation, provisioning URI/QR rendering, windowed
//! code verification, and one-time backup codes.
//!
//! Codes are SHA-1, 6 digits, 30-second steps with a skew of one step to
//! absorb clock drift. Backup codes are Argon2id-hashed at rest and removed
//! from the account on first successful use.

use crate::account::Account;
use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng as HashOsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::{rngs::OsRng, RngCore};
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
const TOTP_SKEW_STEPS: u8 = 1;

const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_LEN: usize = 12;
const BACKUP_CODE_GROUP_SIZE: usize = 4;
// No 0/O/1/I: codes get typed from a printout.
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Enrollment material handed to the client exactly once.
#[derive(Debug)]
pub struct Enrollment {
    pub secret: String,
    pub provisioning_uri: String,
    pub qr_code_data_url: String,
    pub backup_codes: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct TotpEngine {
    issuer: String,
}

impl TotpEngine {
    #[must_use]
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    /// Generate a fresh base32 secret.
    #[must_use]
    pub fn generate_secret(&self) -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    /// Start enrollment for `account_label`: secret, otpauth URI, QR data
    /// URL, and a backup-code batch. The hashes for the batch are returned
    /// separately so the caller can stage them on the account.
    ///
    /// # Errors
    /// Fails when secret material cannot be generated or the QR image cannot
    /// be rendered.
    pub fn begin_enrollment(&self, account_label: &str) -> Result<(Enrollment, Vec<String>)> {
        let secret = self.generate_secret();
        let totp = self.build(&secret, account_label)?;

        let qr = totp
            .get_qr_base64()
            .map_err(|err| anyhow!("failed to render QR code: {err}"))?;
        let qr_code_data_url = format!("data:image/png;base64,{qr}");

        let batch = BackupCodeBatch::generate()?;
        let enrollment = Enrollment {
            secret: totp.get_secret_base32(),
            provisioning_uri: totp.get_url(),
            qr_code_data_url,
            backup_codes: batch.codes,
        };
        Ok((enrollment, batch.code_hashes))
    }

    /// Verify a code against `secret` for the current step, tolerating one
    /// adjacent step. Codes that are not exactly six digits are rejected
    /// before any cryptographic work.
    #[must_use]
    pub fn verify_code(&self, secret: &str, code: &str) -> bool {
        let code = code.trim();
        if code.len() != TOTP_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let Ok(totp) = self.build(secret, "account") else {
            return false;
        };
        totp.check_current(code).unwrap_or(false)
    }

    fn build(&self, secret: &str, account_label: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|err| anyhow!("invalid TOTP secret: {err:?}"))?;
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|err| anyhow!("failed to initialize TOTP: {err}"))
    }
}

/// A freshly generated backup-code batch (plaintext + hashes).
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl BackupCodeBatch {
    /// Generate [`BACKUP_CODE_COUNT`] codes and their Argon2id hashes.
    pub fn generate() -> Result<Self> {
        let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let code = generate_backup_code()?;
            let hash = hash_backup_code(&code)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Strip separators and uppercase; reject inputs of the wrong shape.
pub fn normalize_backup_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != BACKUP_CODE_LEN {
        return Err(anyhow!("invalid backup code length"));
    }
    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| BACKUP_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow!("invalid backup code characters"));
    }
    Ok(normalized)
}

/// Verify a backup code against one stored hash.
#[must_use]
pub fn verify_backup_code(code: &str, stored_hash: &str) -> bool {
    let Ok(normalized) = normalize_backup_code(code) else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok()
}

/// Single-use consumption: on a match, the hash is removed from the account
/// so the same code can never be replayed. The caller persists the account.
#[must_use]
pub fn consume_backup_code(account: &mut Account, code: &str) -> bool {
    let Some(index) = account
        .backup_code_hashes
        .iter()
        .position(|hash| verify_backup_code(code, hash))
    else {
        return false;
    };
    account.backup_code_hashes.remove(index);
    true
}

fn generate_backup_code() -> Result<String> {
    let mut raw = [0u8; BACKUP_CODE_LEN];
    OsRng
        .try_fill_bytes(&mut raw)
        .context("failed to generate backup code")?;
    let mut normalized = String::with_capacity(BACKUP_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % BACKUP_CODE_ALPHABET.len();
        if let Some(&char_byte) = BACKUP_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_backup_code(&normalized)
}

/// Group a normalized code for display: `XXXX-XXXX-XXXX`.
fn format_backup_code(normalized: &str) -> Result<String> {
    if normalized.len() != BACKUP_CODE_LEN {
        return Err(anyhow!("invalid backup code length"));
    }
    let mut out = String::with_capacity(BACKUP_CODE_LEN + 2);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(BACKUP_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk)?);
    }
    Ok(out)
}

fn hash_backup_code(code: &str) -> Result<String> {
    let normalized = normalize_backup_code(code)?;
    let salt = SaltString::generate(&mut HashOsRng);
    let hash = Argon2::default()
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash backup code: {err}"))?
        .to_string();
    Ok(hash)
}
