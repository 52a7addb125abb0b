//! Activation token encoding.
//!
//! Tokens are short codes read over the phone or typed by an emergency
//! responder, so the alphabet drops the characters people confuse with
//! each other (0/O, 1/I/L).

use breakglass_core::{now_millis, random_bytes, RequestId};

/// Characters a token may contain.
pub const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Token length in characters.
pub const TOKEN_LEN: usize = 10;

/// Derive a fresh activation token for a request.
///
/// Binds the request id, the current time, and fresh randomness, so a
/// re-activation attempt for the same request never reproduces an
/// earlier token.
pub fn activation_token(request_id: &RequestId) -> String {
    let nonce: [u8; 16] = random_bytes();

    let mut hasher = blake3::Hasher::new_derive_key("breakglass-v0-activation-token");
    hasher.update(request_id.as_bytes());
    hasher.update(&now_millis().to_le_bytes());
    hasher.update(&nonce);
    let digest = hasher.finalize();

    encode_token(digest.as_bytes())
}

/// Map the leading bytes of a digest onto the token alphabet.
fn encode_token(digest: &[u8; 32]) -> String {
    digest[..TOKEN_LEN]
        .iter()
        .map(|b| TOKEN_ALPHABET[*b as usize % TOKEN_ALPHABET.len()] as char)
        .collect()
}
