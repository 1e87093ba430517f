//! Second-factor verification: TOTP codes and single-use backup codes.
//!
//! The stored secret is a base32 TOTP seed (SHA-1, 6 digits, 30-second step,
//! one step of clock skew). Backup codes are the fallback when the
//! authenticator is unavailable; they are Argon2id-hashed and consumed on
//! use (see [`backup`]).

pub mod backup;

use anyhow::{anyhow, Result};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;
const TOTP_ISSUER: &str = "Gatehouse";

/// Check a presented code against the stored base32 secret.
///
/// Malformed secrets are treated as verification failures (and logged): a
/// corrupt credential record must not let a login through.
#[must_use]
pub fn verify_totp(secret_base32: &str, account: &str, code: &str) -> bool {
    let totp = match build_totp(secret_base32, account) {
        Ok(totp) => totp,
        Err(err) => {
            warn!("Rejecting two-factor code against unusable secret: {err}");
            return false;
        }
    };
    totp.check_current(code.trim()).unwrap_or(false)
}

/// Generate a fresh base32 TOTP secret for provisioning and fixtures.
pub fn generate_secret() -> Result<String> {
    match Secret::generate_secret().to_encoded() {
        Secret::Encoded(value) => Ok(value),
        Secret::Raw(_) => Err(anyhow!("secret generation produced raw bytes")),
    }
}

fn build_totp(secret_base32: &str, account: &str) -> Result<TOTP> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| anyhow!("invalid TOTP secret: {e:?}"))?;
    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret,
        Some(TOTP_ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_code_verifies() -> Result<()> {
        let secret = generate_secret()?;
        let code = build_totp(&secret, "a@x.com")?
            .generate_current()
            .expect("system time");
        assert!(verify_totp(&secret, "a@x.com", &code));
        assert!(verify_totp(&secret, "a@x.com", &format!(" {code} ")));
        Ok(())
    }

    #[test]
    fn wrong_code_fails() -> Result<()> {
        let secret = generate_secret()?;
        let code = build_totp(&secret, "a@x.com")?
            .generate_current()
            .expect("system time");
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!verify_totp(&secret, "a@x.com", wrong));
        Ok(())
    }

    #[test]
    fn unusable_secret_fails_closed() {
        assert!(!verify_totp("not base32!!", "a@x.com", "123456"));
    }
}
