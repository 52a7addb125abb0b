//! The access request: one break-glass emergency-access case.
//!
//! Requests are append-only history: they are created once, mutated only
//! through the lifecycle transitions below, and never physically deleted.

use serde::{Deserialize, Serialize};

use crate::types::{
    now_millis, AccessType, ActorId, OrgId, RequestId, RequestStatus, SubjectId, Urgency,
};

/// Caller-supplied parameters for a new access request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequestInput {
    /// The protected record owner.
    pub subject_id: SubjectId,

    /// Who is asking for access.
    pub requester_id: ActorId,

    /// Free-text reason presented to approvers.
    pub reason: String,

    /// Reason category.
    pub access_type: AccessType,

    /// Urgency tier; fixes quorum size and duration ceiling.
    pub urgency: Urgency,

    /// Longer free-text justification for the audit record.
    pub justification: String,

    /// Requested access window in hours.
    pub requested_duration_hours: u32,

    /// Organization scope.
    pub organization_id: OrgId,
}

/// One emergency-access case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Opaque unique id, assigned at creation.
    pub id: RequestId,

    pub subject_id: SubjectId,
    pub requester_id: ActorId,
    pub reason: String,
    pub access_type: AccessType,
    pub urgency: Urgency,
    pub justification: String,
    pub requested_duration_hours: u32,
    pub organization_id: OrgId,

    /// Lifecycle status. See [`RequestStatus`] for the transition diagram.
    pub status: RequestStatus,

    /// Creation time (Unix ms).
    pub created_at: i64,

    /// When the access window closes (Unix ms). Fixed at creation:
    /// `created_at + requested_duration_hours`. Key material issued for
    /// this request must expire at exactly this instant.
    pub end_time: i64,

    /// When quorum was reached and key material issued (Unix ms).
    pub activated_at: Option<i64>,

    /// Revocation record, set on manual revoke or auto-expiry.
    pub revoked_at: Option<i64>,
    pub revoked_by: Option<ActorId>,
    pub revocation_reason: Option<String>,
}

impl AccessRequest {
    /// Create a new request in `Requested` status.
    pub fn new(input: AccessRequestInput) -> Self {
        let created_at = now_millis();
        let end_time = created_at + i64::from(input.requested_duration_hours) * 3_600_000;

        Self {
            id: RequestId::generate(),
            subject_id: input.subject_id,
            requester_id: input.requester_id,
            reason: input.reason,
            access_type: input.access_type,
            urgency: input.urgency,
            justification: input.justification,
            requested_duration_hours: input.requested_duration_hours,
            organization_id: input.organization_id,
            status: RequestStatus::Requested,
            created_at,
            end_time,
            activated_at: None,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
        }
    }

    /// Whether the requested duration exceeds the urgency tier's ceiling.
    pub fn exceeds_duration_ceiling(&self) -> bool {
        self.requested_duration_hours > self.urgency.max_duration_hours()
    }

    /// Whether the access window has passed.
    pub fn is_past_end(&self, now: i64) -> bool {
        now >= self.end_time
    }
}
