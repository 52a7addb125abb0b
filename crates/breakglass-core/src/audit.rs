//! Audit ledger entries.
//!
//! Every state-changing operation appends an entry carrying a Blake3
//! proof over its own payload. Entries are never mutated or deleted;
//! tampering is detected by recomputing the proof from the stored
//! payload and comparing.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_value_bytes, json_to_cbor};
use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::types::{now_millis, ActorId, EntryId, OrgId, SubjectId};

/// Operation tag for all break-glass ledger entries. Other subsystems
/// writing to the same ledger use their own tags.
pub const OP_EMERGENCY_ACCESS: &str = "emergency_access";

/// Caller network metadata recorded with an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: EntryId,

    /// Operation tag, e.g. [`OP_EMERGENCY_ACCESS`].
    pub operation: String,

    /// Who performed the operation; the reserved system identity for
    /// clock-driven entries.
    pub actor_id: ActorId,

    /// The protected record owner, when one is involved.
    pub subject_id: Option<SubjectId>,

    /// Organization scope.
    pub organization_id: Option<OrgId>,

    /// Operation-specific structured payload. Integral numbers only;
    /// floats cannot be canonically encoded.
    pub context: serde_json::Value,

    /// Whether the operation succeeded.
    pub success: bool,

    /// Failure detail, when `success` is false.
    pub error_message: Option<String>,

    /// Caller network metadata, when the transport supplied it.
    pub source: Option<SourceMeta>,

    /// Blake3 digest over the canonical encoding of every field above.
    pub proof: Blake3Hash,

    /// Append time (Unix ms).
    pub created_at: i64,
}

impl AuditEntry {
    /// Build an entry and compute its proof. Infallible inputs aside,
    /// this fails only if `context` contains a float.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operation: impl Into<String>,
        actor_id: ActorId,
        subject_id: Option<SubjectId>,
        organization_id: Option<OrgId>,
        context: serde_json::Value,
        success: bool,
        error_message: Option<String>,
        source: Option<SourceMeta>,
    ) -> Result<Self, CoreError> {
        let mut entry = Self {
            id: EntryId::generate(),
            operation: operation.into(),
            actor_id,
            subject_id,
            organization_id,
            context,
            success,
            error_message,
            source,
            proof: Blake3Hash::ZERO,
            created_at: now_millis(),
        };
        entry.proof = entry.compute_proof()?;
        Ok(entry)
    }

    /// Recompute the proof from the stored payload.
    pub fn compute_proof(&self) -> Result<Blake3Hash, CoreError> {
        let bytes = canonical_value_bytes(&self.payload_value()?)?;
        Ok(Blake3Hash::hash(&bytes))
    }

    /// Whether the stored proof matches the payload. A mismatch signals
    /// tampering.
    pub fn verify_proof(&self) -> Result<bool, CoreError> {
        Ok(self.compute_proof()? == self.proof)
    }

    /// The canonical payload: every field except the proof itself.
    fn payload_value(&self) -> Result<Value, CoreError> {
        let opt_text = |v: Option<&str>| match v {
            Some(s) => Value::Text(s.to_string()),
            None => Value::Null,
        };

        let source = match &self.source {
            Some(meta) => Value::Map(vec![
                (Value::Text("ip_address".into()), opt_text(meta.ip_address.as_deref())),
                (Value::Text("user_agent".into()), opt_text(meta.user_agent.as_deref())),
            ]),
            None => Value::Null,
        };

        Ok(Value::Map(vec![
            (Value::Text("id".into()), Value::Text(self.id.to_hex())),
            (Value::Text("operation".into()), Value::Text(self.operation.clone())),
            (Value::Text("actor_id".into()), Value::Text(self.actor_id.to_string())),
            (
                Value::Text("subject_id".into()),
                opt_text(self.subject_id.as_ref().map(|s| s.as_str())),
            ),
            (
                Value::Text("organization_id".into()),
                opt_text(self.organization_id.as_ref().map(|o| o.as_str())),
            ),
            (Value::Text("context".into()), json_to_cbor(&self.context)?),
            (Value::Text("success".into()), Value::Bool(self.success)),
            (
                Value::Text("error_message".into()),
                opt_text(self.error_message.as_deref()),
            ),
            (Value::Text("source".into()), source),
            (Value::Text("created_at".into()), Value::Integer(self.created_at.into())),
        ]))
    }
}

/// Conjunctive filters for ledger queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Match entries whose operation tag is in this set.
    pub operations: Option<Vec<String>>,
    pub subject_id: Option<SubjectId>,
    pub organization_id: Option<OrgId>,
}

impl AuditFilter {
    /// Whether an entry passes every set filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ops) = &self.operations {
            if !ops.iter().any(|op| op == &entry.operation) {
                return false;
            }
        }
        if let Some(subject) = &self.subject_id {
            if entry.subject_id.as_ref() != Some(subject) {
                return false;
            }
        }
        if let Some(org) = &self.organization_id {
            if entry.organization_id.as_ref() != Some(org) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> AuditEntry {
        AuditEntry::new(
            OP_EMERGENCY_ACCESS,
            ActorId::new("dr-grey"),
            Some(SubjectId::new("subject-1")),
            Some(OrgId::new("org-1")),
            json!({"phase": "requested", "urgency": "critical"}),
            true,
            None,
            Some(SourceMeta {
                ip_address: Some("10.0.0.7".into()),
                user_agent: Some("breakglass-cli/0.1".into()),
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_proof_verifies() {
        let e = entry();
        assert_ne!(e.proof, Blake3Hash::ZERO);
        assert!(e.verify_proof().unwrap());
    }

    #[test]
    fn test_tamper_detected() {
        let mut e = entry();
        e.context = json!({"phase": "requested", "urgency": "medium"});
        assert!(!e.verify_proof().unwrap());

        let mut e = entry();
        e.success = false;
        assert!(!e.verify_proof().unwrap());
    }

    #[test]
    fn test_filter_conjunctive() {
        let e = entry();

        assert!(AuditFilter::default().matches(&e));

        let mut f = AuditFilter {
            subject_id: Some(SubjectId::new("subject-1")),
            organization_id: Some(OrgId::new("org-1")),
            operations: Some(vec![OP_EMERGENCY_ACCESS.to_string()]),
        };
        assert!(f.matches(&e));

        // Any mismatching filter excludes the entry.
        f.organization_id = Some(OrgId::new("org-2"));
        assert!(!f.matches(&e));
    }

    #[test]
    fn test_filter_operation_set() {
        let e = entry();
        let f = AuditFilter {
            operations: Some(vec!["profile_update".to_string()]),
            ..Default::default()
        };
        assert!(!f.matches(&e));
    }
}
