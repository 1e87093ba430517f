//! Assertion service: challenge issue and response verification.
//!
//! Flow Overview:
//! 1. `request_assertion` turns the user's stored credentials into a
//!    browser-facing challenge and stashes the protocol state.
//! 2. The browser completes the ceremony with its authenticator.
//! 3. `finish_assertion` consumes the stashed state (single use) and
//!    delegates the cryptographic checks — credential id match, challenge
//!    byte-match, origin/RP binding, signature — to `webauthn-rs`.
//!
//! Raw `WebAuthn` payloads are never logged.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::{
    AuthenticationResult, Passkey, PublicKeyCredential, RequestChallengeResponse, Webauthn,
    WebauthnBuilder,
};

use crate::login::ChallengeCache;
use crate::webauthn::models::{deserialize_passkey, StoredPasskey};

pub struct AssertionService {
    webauthn: Webauthn,
    challenges: Arc<ChallengeCache>,
}

impl AssertionService {
    /// Create the service for the configured relying party.
    ///
    /// # Errors
    /// Returns an error if the origin does not parse or the `WebAuthn`
    /// builder rejects the relying-party parameters.
    pub fn new(rp_id: &str, rp_origin: &str, challenges: Arc<ChallengeCache>) -> Result<Self> {
        let rp_origin_url = Url::parse(rp_origin)?;
        let webauthn = WebauthnBuilder::new(rp_id, &rp_origin_url)?
            .rp_name("Gatehouse")
            .build()?;
        Ok(Self {
            webauthn,
            challenges,
        })
    }

    /// Issue an assertion challenge limited to the given stored credentials.
    ///
    /// # Errors
    /// Returns an error when none of the stored records deserialize into a
    /// usable credential or challenge generation fails.
    pub async fn request_assertion(
        &self,
        stored: &[StoredPasskey],
    ) -> Result<(Uuid, RequestChallengeResponse)> {
        let passkeys: Vec<Passkey> = stored
            .iter()
            .filter_map(|key| deserialize_passkey(&key.passkey_data).ok())
            .collect();
        if passkeys.is_empty() {
            return Err(anyhow!("no usable credentials on record"));
        }

        let (request, state) = self.webauthn.start_passkey_authentication(&passkeys)?;
        let challenge_id = self.challenges.stash_assertion(state).await;
        Ok((challenge_id, request))
    }

    /// Verify the browser's signed response against the stashed state.
    ///
    /// # Errors
    /// Returns an error when the challenge is unknown, expired, or already
    /// consumed, or when `webauthn-rs` rejects the assertion.
    pub async fn finish_assertion(
        &self,
        challenge_id: Uuid,
        credential: &PublicKeyCredential,
    ) -> Result<AuthenticationResult> {
        let state = self
            .challenges
            .take_assertion(challenge_id)
            .await
            .ok_or_else(|| anyhow!("authentication challenge not found or expired"))?;
        Ok(self
            .webauthn
            .finish_passkey_authentication(credential, &state)?)
    }
}
