//! Issued key material: the time-bounded capability created at activation.
//!
//! Keys are burn-once per request: created exactly once when quorum is
//! reached, deactivated by revocation or expiry, never reactivated and
//! never deleted (audit retention).

use serde::{Deserialize, Serialize};

use crate::types::{KeyId, RequestId};

/// Key material bound to one activated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub id: KeyId,

    /// The owning request.
    pub request_id: RequestId,

    /// Derivation salt, stored so the context digest can be recomputed.
    pub salt: [u8; 16],

    /// The key seed masked against the context digest. Reversible only
    /// by holders of the master secret plus the stored context fields.
    pub masked_key: [u8; 32],

    /// Start of the validity window (Unix ms).
    pub valid_from: i64,

    /// End of the validity window (Unix ms). Must equal the owning
    /// request's `end_time`.
    pub valid_until: i64,

    /// Times this key has been presented by downstream consumers.
    pub use_count: u32,

    /// Usage cap.
    pub max_uses: u32,

    /// Once false, never true again.
    pub is_active: bool,
}

impl KeyMaterial {
    /// Issue fresh key material for an activation.
    pub fn issue(
        request_id: RequestId,
        salt: [u8; 16],
        masked_key: [u8; 32],
        valid_from: i64,
        valid_until: i64,
        max_uses: u32,
    ) -> Self {
        Self {
            id: KeyId::generate(),
            request_id,
            salt,
            masked_key,
            valid_from,
            valid_until,
            use_count: 0,
            max_uses,
            is_active: true,
        }
    }

    /// Whether a downstream consumer may use this key right now.
    pub fn is_usable(&self, now: i64) -> bool {
        self.is_active
            && now >= self.valid_from
            && now < self.valid_until
            && self.use_count < self.max_uses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(valid_from: i64, valid_until: i64) -> KeyMaterial {
        KeyMaterial {
            id: KeyId::generate(),
            request_id: RequestId::generate(),
            salt: [1u8; 16],
            masked_key: [2u8; 32],
            valid_from,
            valid_until,
            use_count: 0,
            max_uses: 10,
            is_active: true,
        }
    }

    #[test]
    fn test_usable_within_window() {
        let k = key(1_000, 2_000);
        assert!(!k.is_usable(999));
        assert!(k.is_usable(1_000));
        assert!(k.is_usable(1_999));
        assert!(!k.is_usable(2_000));
    }

    #[test]
    fn test_deactivated_never_usable() {
        let mut k = key(0, i64::MAX);
        k.is_active = false;
        assert!(!k.is_usable(1));
    }

    #[test]
    fn test_usage_cap() {
        let mut k = key(0, i64::MAX);
        k.use_count = k.max_uses;
        assert!(!k.is_usable(1));
    }
}
