//! Login orchestration: password, two-factor, and security key sign-in.
//!
//! Flow Overview:
//! 1) Every credential-bearing attempt bumps the `backend-login` abuse
//!    counter, then the blocked check runs — before any user lookup, so a
//!    blocked channel never learns whether an email exists.
//! 2) Password verification runs against the stored hash (or a dummy hash
//!    when no user matches, keeping both paths the same shape).
//! 3) Users without a second factor get a session immediately. Users with
//!    one get their pending state sealed into the challenge cache and are
//!    redirected to the two-factor step, which accepts a TOTP code or a
//!    single-use backup code.
//! 4) Security key sign-in is an independent entry: challenge out, signed
//!    assertion back, session on success. It shares the same abuse channel.
//!
//! Security boundaries:
//! - Failures surface as generic errors; "no such user" and "wrong
//!   password" are indistinguishable, and a blocked channel answers with a
//!   silent redirect rather than an error.
//! - Every method returns a [`LoginFlow`] that the transport layer consumes
//!   by value: the redirect decision is terminal, nothing mutates after it.
//! - The abuse counter only resets after a fully completed login.

pub mod abuse;
pub mod audit;
pub mod challenge;
pub mod credentials;
pub mod error;
pub mod models;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;


pub use abuse::{AbuseGuard, MemoryAbuseGuard};
pub use audit::{AuditCategory, AuditEvent, AuditSink, MemoryAuditSink};
pub use challenge::{ChallengeCache, PendingTwoFactor};
pub use credentials::hash_password;
pub use error::LoginError;
pub use models::{normalize_email, SessionRecord, User};
pub use session::{IssuedSession, MemorySessionStore, SessionIssuer, SessionStore};
pub use state::LoginConfig;
pub use storage::{PgAbuseGuard, PgAuditSink, PgSessionStore, PgUserStore};
pub use store::{MemoryUserStore, UserStore};

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;
use webauthn_rs::prelude::{PublicKeyCredential, RequestChallengeResponse};

use credentials::PasswordVerifier;
use crate::twofactor;
use crate::webauthn::AssertionService;

/// Abuse channel shared by every backend login path.
pub const LOGIN_CHANNEL: &str = "backend-login";

/// A password login submission, as validated by the transport layer.
#[derive(Debug, Clone)]
pub struct SubmitCredentials {
    pub email: String,
    pub password: String,
    pub stay: bool,
    pub redirect: Option<String>,
}

/// Terminal outcome of a login step.
///
/// Exactly one flow value is produced per attempt, after all counter, audit,
/// and store effects have happened; converting it into a response must be
/// the only thing a caller does with it.
#[derive(Debug)]
pub enum LoginFlow {
    /// Login finished: a session was issued, the client is sent to
    /// `redirect` once.
    Completed {
        session: IssuedSession,
        redirect: String,
    },
    /// Password accepted but a second factor is required; `challenge_id`
    /// references the pending state, `redirect` is the two-factor entry.
    TwoFactorRequired {
        challenge_id: Uuid,
        redirect: String,
    },
    /// Channel is blocked. Deliberately a same-page redirect with no error
    /// body, so throttling is not signaled.
    RateLimited { redirect: String },
    /// Attempt rejected with a generic error.
    Rejected(LoginError),
}

/// Outcome of a security key challenge request.
#[derive(Debug)]
pub enum AssertionStart {
    Challenge {
        challenge_id: Uuid,
        request: RequestChallengeResponse,
    },
    Denied(LoginError),
}

pub struct Orchestrator {
    config: LoginConfig,
    users: Arc<dyn UserStore>,
    abuse: Arc<dyn AbuseGuard>,
    audit: Arc<dyn AuditSink>,
    issuer: SessionIssuer,
    challenges: Arc<ChallengeCache>,
    assertions: AssertionService,
    passwords: PasswordVerifier,
    backup_pepper: Option<Vec<u8>>,
}

impl Orchestrator {
    /// Wire the login core against its injected stores.
    ///
    /// # Errors
    /// Returns an error if the relying-party parameters are unusable or the
    /// password verifier cannot initialize.
    pub fn new(
        config: LoginConfig,
        users: Arc<dyn UserStore>,
        abuse: Arc<dyn AbuseGuard>,
        audit: Arc<dyn AuditSink>,
        sessions: Arc<dyn SessionStore>,
        sealing_key: [u8; 32],
        backup_pepper: Option<Vec<u8>>,
    ) -> Result<Self> {
        let challenges = Arc::new(ChallengeCache::new(
            sealing_key,
            Duration::from_secs(config.challenge_ttl_seconds()),
        ));
        let assertions =
            AssertionService::new(config.rp_id(), config.rp_origin(), Arc::clone(&challenges))?;
        let issuer = SessionIssuer::new(sessions, config.stay_session_ttl_seconds());
        let passwords = PasswordVerifier::new()?;
        Ok(Self {
            config,
            users,
            abuse,
            audit,
            issuer,
            challenges,
            assertions,
            passwords,
            backup_pepper,
        })
    }

    #[must_use]
    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Password step: verify credentials and either finish the login or park
    /// it behind the two-factor challenge.
    pub async fn submit_password(&self, submit: SubmitCredentials) -> Result<LoginFlow> {
        self.abuse.count_up(LOGIN_CHANNEL).await?;
        if self.abuse.is_blocked(LOGIN_CHANNEL).await? {
            return Ok(LoginFlow::RateLimited {
                redirect: self.config.login_view().to_string(),
            });
        }

        let email = normalize_email(&submit.email);
        let user = self.users.find_by_email(&email).await?;
        let password_ok = self.passwords.verify(
            user.as_ref().map(|user| user.password_hash.as_str()),
            &submit.password,
        );
        let Some(user) = user.filter(|_| password_ok) else {
            self.record_event(AuditCategory::LoginFailed, None, &email)
                .await;
            return Ok(LoginFlow::Rejected(LoginError::InvalidCredentials));
        };

        if user.two_factor_secret.is_some() {
            let pending = PendingTwoFactor {
                user_id: user.id,
                stay: submit.stay,
                totp_secret: user.two_factor_secret.clone(),
                backup_code_hashes: self.users.backup_code_hashes(user.id).await?,
                redirect: self.config.resolve_redirect(submit.redirect.as_deref()),
            };
            let challenge_id = self.challenges.stash_two_factor(&pending).await?;
            return Ok(LoginFlow::TwoFactorRequired {
                challenge_id,
                redirect: self.config.two_factor_view().to_string(),
            });
        }

        let redirect = self.config.resolve_redirect(submit.redirect.as_deref());
        self.complete(&user, submit.stay, redirect).await
    }

    /// Two-factor step: consume the pending challenge and verify a TOTP code
    /// or a backup code. The challenge is gone after this call either way.
    pub async fn verify_two_factor(&self, challenge_id: Uuid, code: &str) -> Result<LoginFlow> {
        self.abuse.count_up(LOGIN_CHANNEL).await?;
        if self.abuse.is_blocked(LOGIN_CHANNEL).await? {
            return Ok(LoginFlow::RateLimited {
                redirect: self.config.login_view().to_string(),
            });
        }

        let Some(pending) = self.challenges.take_two_factor(challenge_id).await else {
            return Ok(LoginFlow::Rejected(LoginError::InvalidCredentials));
        };
        let Some(user) = self.users.find_by_id(pending.user_id).await? else {
            warn!("Pending two-factor challenge for a vanished user");
            return Ok(LoginFlow::Rejected(LoginError::InvalidCredentials));
        };

        if !self.second_factor_matches(&user, &pending, code).await? {
            self.record_event(AuditCategory::LoginFailed, Some(user.id), &user.email)
                .await;
            return Ok(LoginFlow::Rejected(LoginError::InvalidCredentials));
        }

        self.complete(&user, pending.stay, pending.redirect).await
    }

    /// Security key step one: issue an assertion challenge for the user's
    /// registered credentials. No challenge is stored on denial.
    pub async fn webauthn_request_args(&self, email: &str) -> Result<AssertionStart> {
        if self.abuse.is_blocked(LOGIN_CHANNEL).await? {
            return Ok(AssertionStart::Denied(LoginError::RateLimited));
        }

        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(AssertionStart::Denied(LoginError::InvalidFido2Request));
        };
        let stored = self.users.passkeys(user.id).await?;
        if stored.is_empty() {
            return Ok(AssertionStart::Denied(LoginError::InvalidFido2Request));
        }

        match self.assertions.request_assertion(&stored).await {
            Ok((challenge_id, request)) => Ok(AssertionStart::Challenge {
                challenge_id,
                request,
            }),
            Err(err) => {
                warn!("Failed to issue assertion challenge: {err}");
                Ok(AssertionStart::Denied(LoginError::InvalidFido2Request))
            }
        }
    }

    /// Security key step two: verify the signed assertion and finish the
    /// login. The challenge is single use; a replay misses it and fails.
    pub async fn webauthn_complete(
        &self,
        email: &str,
        challenge_id: Uuid,
        credential: &PublicKeyCredential,
        stay: bool,
        redirect: Option<&str>,
    ) -> Result<LoginFlow> {
        self.abuse.count_up(LOGIN_CHANNEL).await?;
        if self.abuse.is_blocked(LOGIN_CHANNEL).await? {
            return Ok(LoginFlow::RateLimited {
                redirect: self.config.login_view().to_string(),
            });
        }

        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(LoginFlow::Rejected(LoginError::InvalidFido2Request));
        };

        let verified = match self.assertions.finish_assertion(challenge_id, credential).await {
            Ok(verified) => verified,
            Err(err) => {
                warn!("Security key assertion rejected: {err}");
                self.record_event(AuditCategory::LoginFailed, Some(user.id), &user.email)
                    .await;
                return Ok(LoginFlow::Rejected(LoginError::Fido2VerificationFailed));
            }
        };

        // The assertion must resolve to a credential registered to the user
        // whose email was submitted, not merely to any stashed challenge.
        let stored = self.users.passkeys(user.id).await?;
        let credential_id: &[u8] = verified.cred_id().as_ref();
        if !stored
            .iter()
            .any(|key| key.credential_id == credential_id)
        {
            self.record_event(AuditCategory::LoginFailed, Some(user.id), &user.email)
                .await;
            return Ok(LoginFlow::Rejected(LoginError::Fido2VerificationFailed));
        }

        let redirect = self.config.resolve_redirect(redirect);
        self.complete(&user, stay, redirect).await
    }

    /// Resolve a presented session token.
    pub async fn introspect_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        self.issuer.lookup(token).await
    }

    /// Destroy the session behind a presented token.
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.issuer.delete(token).await
    }

    async fn second_factor_matches(
        &self,
        user: &User,
        pending: &PendingTwoFactor,
        code: &str,
    ) -> Result<bool> {
        if let Some(secret) = pending.totp_secret.as_deref() {
            if twofactor::verify_totp(secret, &user.email, code) {
                return Ok(true);
            }
        }
        let Some(matched) = twofactor::backup::find_matching_hash(
            code,
            &pending.backup_code_hashes,
            self.backup_pepper.as_deref(),
        ) else {
            return Ok(false);
        };
        // Consumption decides: if another attempt spent this code first, the
        // match no longer counts.
        self.users.consume_backup_code(user.id, matched).await
    }

    async fn complete(&self, user: &User, stay: bool, redirect: String) -> Result<LoginFlow> {
        let session = self.issuer.create(user, stay).await?;
        self.record_event(AuditCategory::LoginSuccess, Some(user.id), &user.email)
            .await;
        self.abuse.reset(LOGIN_CHANNEL).await?;
        Ok(LoginFlow::Completed { session, redirect })
    }

    async fn record_event(&self, category: AuditCategory, user_id: Option<Uuid>, email: &str) {
        // Audit is best-effort: a sink failure must not abort the attempt.
        if let Err(err) = self
            .audit
            .record(category, user_id, json!({ "email": email }))
            .await
        {
            error!("Failed to record audit event: {err}");
        }
    }
}
