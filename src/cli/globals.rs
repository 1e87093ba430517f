use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

/// Key material handed from the CLI to the server wiring. Both values are
/// optional: without a sealing key each process generates its own, and
/// without a pepper backup codes are verified unpeppered.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    sealing_key: Option<SecretString>,
    backup_pepper: Option<SecretString>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(sealing_key: Option<SecretString>, backup_pepper: Option<SecretString>) -> Self {
        Self {
            sealing_key,
            backup_pepper,
        }
    }

    /// Decode the configured sealing key (base64, 32 bytes).
    ///
    /// # Errors
    /// Returns an error when a key is configured but does not decode to
    /// exactly 32 bytes.
    pub fn sealing_key_bytes(&self) -> Result<Option<[u8; 32]>> {
        let Some(secret) = &self.sealing_key else {
            return Ok(None);
        };
        let decoded = STANDARD
            .decode(secret.expose_secret().trim())
            .context("sealing key is not valid base64")?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| anyhow!("sealing key must decode to 32 bytes"))?;
        Ok(Some(key))
    }

    #[must_use]
    pub fn backup_pepper_bytes(&self) -> Option<Vec<u8>> {
        self.backup_pepper
            .as_ref()
            .map(|pepper| pepper.expose_secret().as_bytes().to_vec())
    }
}
