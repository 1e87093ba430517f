//! `WebAuthn` assertion verification for security key sign-in.
//!
//! Only the authentication half of the ceremony lives here: credentials are
//! registered and stored by external provisioning, this module issues
//! challenges against them and verifies the browser's signed response.

mod models;
mod service;

pub use models::{deserialize_passkey, serialize_passkey, StoredPasskey};
pub use service::AssertionService;
