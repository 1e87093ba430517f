//! # Gatehouse (Backend Login & Session Establishment)
//!
//! `gatehouse` is the login authority for a backend application. It owns the
//! login state machine — password authentication with an optional TOTP second
//! factor, WebAuthn (security key) sign-in — plus abuse throttling, audit
//! events, and cookie session issuance. User records and registered
//! credentials are provisioned elsewhere; this service only reads them.
//!
//! ## Login flows
//!
//! - **Password:** the abuse counter is bumped before anything else, then the
//!   presented password is verified against the stored Argon2id hash. Without
//!   a second factor a session is issued immediately; with one, the pending
//!   state is stashed server-side and the client is redirected to the
//!   two-factor step.
//! - **Two-factor:** a TOTP code or a single-use backup code completes the
//!   login started by the password step. The pending challenge is consumed
//!   exactly once.
//! - **WebAuthn:** an assertion challenge is issued for the user's registered
//!   credentials and verified on the return trip; no password is involved.
//!
//! ## Security boundaries
//!
//! - Every credential-bearing attempt counts against the `backend-login`
//!   channel before its outcome is evaluated; a blocked channel terminates
//!   with a silent redirect rather than an error.
//! - Invalid email and invalid password are indistinguishable to callers, in
//!   responses and in timing.
//! - Session tokens are stored hashed, pending two-factor state is sealed at
//!   rest, and challenges are single-consumer; raw values only ever travel to
//!   the client.

pub mod api;
pub mod cli;
pub mod login;
pub mod twofactor;
pub mod webauthn;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
