//! Key derivation for emergency access.
//!
//! Produces context-bound masked keys and human-presentable activation
//! tokens. All key material is derived through domain-separated Blake3
//! from a master secret injected at construction; nothing in this crate
//! touches storage or the clock beyond token freshness.

pub mod derivation;
pub mod error;
pub mod token;

pub use derivation::{DerivedKey, KeyDerivation, MasterSecret};
pub use error::KeyError;
pub use token::{activation_token, TOKEN_ALPHABET, TOKEN_LEN};
