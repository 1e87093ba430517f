//! Single-use backup codes for two-factor login.
//!
//! Codes are short grouped strings over an alphabet without lookalike
//! characters, Argon2id-hashed with an optional server-side pepper. A code
//! that verifies is consumed by the caller; the hash set here is only ever
//! read.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::{rngs::OsRng, RngCore};

const BACKUP_CODE_COUNT: usize = 8;
const BACKUP_CODE_LEN: usize = 10;
const BACKUP_CODE_GROUP_SIZE: usize = 5;
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated backup-code batch (plaintext + hashes).
#[derive(Debug)]
pub struct BackupCodeSet {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl BackupCodeSet {
    /// Generate a new batch. The plaintext codes are shown to the user once;
    /// only the hashes are stored.
    pub fn generate(pepper: Option<&[u8]>) -> Result<Self> {
        let mut rng = OsRng;
        Self::generate_with_rng(&mut rng, pepper)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, pepper: Option<&[u8]>) -> Result<Self> {
        let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let code = generate_code(rng)?;
            let hash = hash_backup_code(&code, pepper)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Normalize a presented backup code for verification.
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

/// Format a normalized backup code for display.
pub fn format_backup_code(normalized: &str) -> Result<String> {
    if normalized.len() != BACKUP_CODE_LEN {
        return Err(anyhow!("invalid backup code length"));
    }
    let mut out = String::with_capacity(BACKUP_CODE_LEN + 1);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(BACKUP_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid backup code chunk")?);
    }
    Ok(out)
}

/// Verify a presented code against a stored hash.
pub fn verify_backup_code(code: &str, stored_hash: &str, pepper: Option<&[u8]>) -> Result<bool> {
    let normalized = normalize_backup_code(code)?;
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid backup code hash"))?;
    Ok(argon2_for(pepper)?
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

/// Find the stored hash a presented code matches, if any. Only the returned
/// hash may be consumed; verification never continues past the first match.
#[must_use]
pub fn find_matching_hash<'a>(
    code: &str,
    stored_hashes: &'a [String],
    pepper: Option<&[u8]>,
) -> Option<&'a str> {
    stored_hashes
        .iter()
        .find(|hash| verify_backup_code(code, hash, pepper).unwrap_or(false))
        .map(String::as_str)
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; BACKUP_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(BACKUP_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % BACKUP_CODE_ALPHABET.len();
        if let Some(&char_byte) = BACKUP_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_backup_code(&normalized)
}

fn hash_backup_code(code: &str, pepper: Option<&[u8]>) -> Result<String> {
    let normalized = normalize_backup_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2_for(pepper)?
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash backup code"))?
        .to_string();
    Ok(hash)
}

fn argon2_for(pepper: Option<&[u8]>) -> Result<Argon2<'_>> {
    match pepper {
        None => Ok(Argon2::default()),
        Some(pepper) => Argon2::new_with_secret(
            pepper,
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2::Params::default(),
        )
        .map_err(|_| anyhow!("failed to initialize Argon2id")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        let normalized = normalize_backup_code("abcde-fghjk").unwrap();
        assert_eq!(normalized, "ABCDEFGHJK");
    }

    #[test]
    fn normalize_rejects_bad_input() {
        assert!(normalize_backup_code("short").is_err());
        assert!(normalize_backup_code("ABCDE-FGH10").is_err()); // '0' and '1' excluded
    }

    #[test]
    fn format_groups_of_five() {
        assert_eq!(format_backup_code("ABCDEFGHJK").unwrap(), "ABCDE-FGHJK");
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let batch = BackupCodeSet::generate(None).unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(verify_backup_code(code, hash, None).unwrap());
        assert!(!verify_backup_code("ABCDE-22222", hash, None).unwrap());
    }

    #[test]
    fn pepper_is_part_of_the_hash() {
        let batch = BackupCodeSet::generate(Some(b"pepper")).unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(verify_backup_code(code, hash, Some(b"pepper")).unwrap());
        assert!(!verify_backup_code(code, hash, None).unwrap());
        assert!(!verify_backup_code(code, hash, Some(b"other")).unwrap());
    }

    #[test]
    fn find_matching_hash_returns_first_match_only() {
        let batch = BackupCodeSet::generate(None).unwrap();
        let code = batch.codes.first().unwrap();
        let matched = find_matching_hash(code, &batch.code_hashes, None).unwrap();
        assert_eq!(matched, batch.code_hashes.first().unwrap());
        assert!(find_matching_hash("ABCDE-22222", &batch.code_hashes, None).is_none());
    }
}
