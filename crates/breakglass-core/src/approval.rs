//! Approver votes.
//!
//! An approval is one approver's vote on exactly one request. Approvals
//! are immutable after creation and never deleted; the store enforces
//! that the pair (request id, approver id) is unique.

use serde::{Deserialize, Serialize};

use crate::crypto::Blake3Hash;
use crate::types::{now_millis, ActorId, ApprovalId, RequestId, Role};

/// One approver's vote on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,

    /// The request being voted on.
    pub request_id: RequestId,

    pub approver_id: ActorId,
    pub approver_role: Role,

    /// Free-text reason recorded with the vote.
    pub reason: String,

    /// Digest over the vote content. Supplied by the caller or generated
    /// deterministically from the vote fields. Not a public-key signature.
    pub signature: String,

    /// Vote time (Unix ms).
    pub created_at: i64,
}

impl Approval {
    /// Create a new vote. If `signature` is `None`, a deterministic
    /// digest over `request:approver:reason:timestamp` is generated.
    pub fn new(
        request_id: RequestId,
        approver_id: ActorId,
        approver_role: Role,
        reason: impl Into<String>,
        signature: Option<String>,
    ) -> Self {
        let reason = reason.into();
        let created_at = now_millis();
        let signature = signature.unwrap_or_else(|| {
            default_signature(&request_id, &approver_id, &reason, created_at)
        });

        Self {
            id: ApprovalId::generate(),
            request_id,
            approver_id,
            approver_role,
            reason,
            signature,
            created_at,
        }
    }
}

/// Deterministic vote digest: `hash(requestId:approverId:reason:timestamp)`.
pub fn default_signature(
    request_id: &RequestId,
    approver_id: &ActorId,
    reason: &str,
    timestamp: i64,
) -> String {
    let message = format!("{}:{}:{}:{}", request_id, approver_id, reason, timestamp);
    Blake3Hash::hash(message.as_bytes()).to_hex()
}
