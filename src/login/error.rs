//! Login failure taxonomy.
//!
//! Every variant renders as a generic message. Callers must never surface
//! which internal check failed — in particular, a missing user and a wrong
//! password produce the same `InvalidCredentials`.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoginError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("too many attempts")]
    RateLimited,
    #[error("security key sign-in is not available")]
    InvalidFido2Request,
    #[error("security key verification failed")]
    Fido2VerificationFailed,
}

#[cfg(test)]
mod tests {
    use super::LoginError;

    #[test]
    fn messages_stay_generic() {
        assert_eq!(
            LoginError::InvalidCredentials.to_string(),
            "invalid email or password"
        );
        assert_eq!(
            LoginError::InvalidFido2Request.to_string(),
            "security key sign-in is not available"
        );
        assert_eq!(
            LoginError::Fido2VerificationFailed.to_string(),
            "security key verification failed"
        );
    }
}
