//! Context-bound key derivation.
//!
//! Every activation issues a fresh 32-byte key seed, stored only in
//! masked form. The mask is a Blake3 context digest over the master
//! secret, a random salt, and the request's identity fields (subject,
//! requester, request id, expiry), so the seed can be recovered only by
//! a holder of the master secret together with the stored salt and the
//! request row itself. Fresh randomness in both the salt and the seed
//! means identical context never reproduces an issued key.

use breakglass_core::{random_bytes, ActorId, Blake3Hash, RequestId, SubjectId};

use crate::error::KeyError;

const CONTEXT_DOMAIN: &str = "breakglass-v0-context";
const REQUEST_DOMAIN: &str = "breakglass-v0-request";

/// Process-wide key material, injected at construction.
///
/// Immutable once created. Debug output is redacted.
#[derive(Clone)]
pub struct MasterSecret([u8; 32]);

impl MasterSecret {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh secret. Intended for tests and first-run setup;
    /// deployments load the secret from configuration.
    pub fn generate() -> Self {
        Self(random_bytes())
    }

    /// Parse a 64-character hex string, the configuration wire format.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| KeyError::InvalidSecret(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSecret("expected 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

/// Output of a single derivation.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    /// Seed XOR context digest. Safe to persist.
    pub masked_key: [u8; 32],
    /// Salt that went into the context digest. Persisted alongside.
    pub salt: [u8; 16],
    /// Short code handed to the responder out of band.
    pub activation_token: String,
}

/// Derives emergency keys bound to a request context.
pub struct KeyDerivation {
    master_secret: MasterSecret,
}

impl KeyDerivation {
    pub fn new(master_secret: MasterSecret) -> Self {
        Self { master_secret }
    }

    /// Derive key material for an activation.
    ///
    /// Pure over its inputs plus fresh randomness; never fails.
    pub fn derive(
        &self,
        subject: &SubjectId,
        requester: &ActorId,
        request_id: &RequestId,
        expires_at_ms: i64,
    ) -> DerivedKey {
        let salt: [u8; 16] = random_bytes();
        let seed: [u8; 32] = random_bytes();

        let digest = self.context_digest(&salt, subject, requester, request_id, expires_at_ms);

        let mut masked_key = [0u8; 32];
        for (i, byte) in masked_key.iter_mut().enumerate() {
            *byte = seed[i] ^ digest[i];
        }

        DerivedKey {
            masked_key,
            salt,
            activation_token: crate::token::activation_token(request_id),
        }
    }

    /// Recover the key seed from its masked form.
    ///
    /// Requires the same context fields the mask was built over; any
    /// mismatch yields garbage rather than an error, which is the point.
    pub fn unmask(
        &self,
        masked_key: &[u8; 32],
        salt: &[u8; 16],
        subject: &SubjectId,
        requester: &ActorId,
        request_id: &RequestId,
        expires_at_ms: i64,
    ) -> [u8; 32] {
        let digest = self.context_digest(salt, subject, requester, request_id, expires_at_ms);

        let mut seed = [0u8; 32];
        for (i, byte) in seed.iter_mut().enumerate() {
            *byte = masked_key[i] ^ digest[i];
        }
        seed
    }

    /// Salted digest binding a request's identity fields, attached to the
    /// request's audit entry. Recomputable only with the master secret.
    pub fn request_digest(
        &self,
        subject: &SubjectId,
        requester: &ActorId,
        request_id: &RequestId,
    ) -> (Blake3Hash, [u8; 16]) {
        let salt: [u8; 16] = random_bytes();

        let mut hasher = blake3::Hasher::new_derive_key(REQUEST_DOMAIN);
        hasher.update(self.master_secret.as_bytes());
        hasher.update(&salt);
        hasher.update(subject.as_str().as_bytes());
        hasher.update(requester.as_str().as_bytes());
        hasher.update(request_id.as_bytes());

        (Blake3Hash::from_bytes(*hasher.finalize().as_bytes()), salt)
    }

    /// Recompute a request digest against a known salt, for verification.
    pub fn verify_request_digest(
        &self,
        salt: &[u8; 16],
        subject: &SubjectId,
        requester: &ActorId,
        request_id: &RequestId,
    ) -> Blake3Hash {
        let mut hasher = blake3::Hasher::new_derive_key(REQUEST_DOMAIN);
        hasher.update(self.master_secret.as_bytes());
        hasher.update(salt);
        hasher.update(subject.as_str().as_bytes());
        hasher.update(requester.as_str().as_bytes());
        hasher.update(request_id.as_bytes());
        Blake3Hash::from_bytes(*hasher.finalize().as_bytes())
    }

    fn context_digest(
        &self,
        salt: &[u8; 16],
        subject: &SubjectId,
        requester: &ActorId,
        request_id: &RequestId,
        expires_at_ms: i64,
    ) -> [u8; 32] {
        // Expiry is bound as its decimal millisecond string so the digest
        // matches what the request row stores, independent of any
        // calendar formatting.
        let mut hasher = blake3::Hasher::new_derive_key(CONTEXT_DOMAIN);
        hasher.update(self.master_secret.as_bytes());
        hasher.update(salt);
        hasher.update(subject.as_str().as_bytes());
        hasher.update(requester.as_str().as_bytes());
        hasher.update(request_id.as_bytes());
        hasher.update(expires_at_ms.to_string().as_bytes());
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn derivation() -> KeyDerivation {
        KeyDerivation::new(MasterSecret::new([42u8; 32]))
    }

    #[test]
    fn test_unmask_recovers_seed() {
        let kd = derivation();
        let subject = SubjectId::new("subject-1");
        let requester = ActorId::new("dr-grey");
        let request_id = RequestId::generate();

        let derived = kd.derive(&subject, &requester, &request_id, 1_700_000_000_000);
        let seed = kd.unmask(
            &derived.masked_key,
            &derived.salt,
            &subject,
            &requester,
            &request_id,
            1_700_000_000_000,
        );

        // Re-masking with the recovered seed reproduces the stored key.
        let digest =
            kd.context_digest(&derived.salt, &subject, &requester, &request_id, 1_700_000_000_000);
        let remasked: Vec<u8> = seed.iter().zip(digest.iter()).map(|(a, b)| a ^ b).collect();
        assert_eq!(remasked, derived.masked_key);
    }

    #[test]
    fn test_wrong_context_yields_different_seed() {
        let kd = derivation();
        let subject = SubjectId::new("subject-1");
        let requester = ActorId::new("dr-grey");
        let request_id = RequestId::generate();

        let derived = kd.derive(&subject, &requester, &request_id, 1_700_000_000_000);
        let right = kd.unmask(
            &derived.masked_key,
            &derived.salt,
            &subject,
            &requester,
            &request_id,
            1_700_000_000_000,
        );
        let wrong = kd.unmask(
            &derived.masked_key,
            &derived.salt,
            &subject,
            &requester,
            &request_id,
            1_700_000_000_001,
        );
        assert_ne!(right, wrong);
    }

    #[test]
    fn test_same_context_never_reissues_a_key() {
        let kd = derivation();
        let subject = SubjectId::new("subject-1");
        let requester = ActorId::new("dr-grey");
        let request_id = RequestId::generate();

        let a = kd.derive(&subject, &requester, &request_id, 1_700_000_000_000);
        let b = kd.derive(&subject, &requester, &request_id, 1_700_000_000_000);
        assert_ne!(a.masked_key, b.masked_key);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.activation_token, b.activation_token);
    }

    #[test]
    fn test_master_secret_hex_roundtrip() {
        let hex = "aa".repeat(32);
        let secret = MasterSecret::from_hex(&hex).unwrap();
        assert_eq!(secret.as_bytes(), &[0xaa; 32]);

        assert!(MasterSecret::from_hex("deadbeef").is_err());
        assert!(MasterSecret::from_hex("not hex").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = MasterSecret::new([0xaa; 32]);
        assert_eq!(format!("{:?}", secret), "MasterSecret(..)");
    }

    #[test]
    fn test_request_digest_verifies_with_salt() {
        let kd = derivation();
        let subject = SubjectId::new("subject-1");
        let requester = ActorId::new("dr-grey");
        let request_id = RequestId::generate();

        let (digest, salt) = kd.request_digest(&subject, &requester, &request_id);
        let recomputed = kd.verify_request_digest(&salt, &subject, &requester, &request_id);
        assert_eq!(digest, recomputed);

        let other = KeyDerivation::new(MasterSecret::new([7u8; 32]));
        let mismatch = other.verify_request_digest(&salt, &subject, &requester, &request_id);
        assert_ne!(digest, mismatch);
    }

    proptest! {
        #[test]
        fn prop_unmask_is_inverse_of_masking(
            secret in prop::array::uniform32(any::<u8>()),
            expiry in 0i64..4_102_444_800_000,
            subject in "[a-z0-9-]{1,24}",
            requester in "[a-z0-9-]{1,24}",
        ) {
            let kd = KeyDerivation::new(MasterSecret::new(secret));
            let subject = SubjectId::new(subject);
            let requester = ActorId::new(requester);
            let request_id = RequestId::generate();

            let derived = kd.derive(&subject, &requester, &request_id, expiry);
            let seed = kd.unmask(
                &derived.masked_key,
                &derived.salt,
                &subject,
                &requester,
                &request_id,
                expiry,
            );
            // XOR cancellation: masking the seed again gives back the mask.
            let digest = kd.context_digest(&derived.salt, &subject, &requester, &request_id, expiry);
            let remasked: Vec<u8> =
                seed.iter().zip(digest.iter()).map(|(a, b)| a ^ b).collect();
            prop_assert_eq!(remasked, derived.masked_key.to_vec());
        }
    }
}
