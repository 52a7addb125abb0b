//! Store trait: the abstract interface for break-glass persistence.
//!
//! This trait is the record-store boundary of the engine. Implementations
//! include SQLite (primary) and in-memory (for tests). No entity is ever
//! physically deleted through this interface.

use async_trait::async_trait;
use breakglass_core::{
    AccessRequest, ActorId, Approval, AuditEntry, AuditFilter, KeyMaterial, OrgId, RequestId,
    SubjectId,
};

use crate::error::Result;

/// Result of inserting an approval vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalInsert {
    /// The vote was recorded.
    Inserted,
    /// This approver already voted on this request. The rejection comes
    /// from the storage-layer uniqueness constraint, not a check-then-insert
    /// in application code; two simultaneous votes cannot both succeed.
    Duplicate,
}

/// The Store trait: async interface for break-glass persistence.
///
/// # Design Notes
///
/// - **Conditional transitions**: [`transition_to_active`] and
///   [`mark_revoked`] are atomic compare-and-set updates. Under concurrent
///   callers only one wins; the loser observes `false`.
/// - **Uniqueness at the data layer**: one vote per (request, approver),
///   and at most one Active request per subject.
/// - **Append-only audit**: audit entries can only be inserted and read.
///
/// [`transition_to_active`]: Store::transition_to_active
/// [`mark_revoked`]: Store::mark_revoked
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Access Requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a new request (status `Requested`).
    async fn insert_request(&self, request: &AccessRequest) -> Result<()>;

    /// Get a request by id.
    async fn get_request(&self, id: &RequestId) -> Result<Option<AccessRequest>>;

    /// Find the subject's Active request, if one exists. At most one can.
    async fn find_active_for_subject(&self, subject: &SubjectId) -> Result<Option<AccessRequest>>;

    /// List Active requests, optionally scoped to an organization.
    async fn list_active(&self, organization: Option<&OrgId>) -> Result<Vec<AccessRequest>>;

    /// Transition `Requested -> Active`, setting `activated_at`.
    ///
    /// Returns `true` only if the request was in `Requested` status when
    /// the update ran; the loser of a concurrent activation race gets
    /// `false` and must not issue key material.
    async fn transition_to_active(&self, id: &RequestId, activated_at: i64) -> Result<bool>;

    /// Transition to `Revoked`, recording revoker, reason and time.
    ///
    /// Returns `false` if the request was already terminal (double
    /// revocation is a safe no-op; the expiry timer and a manual revoke
    /// may race here).
    async fn mark_revoked(
        &self,
        id: &RequestId,
        revoked_by: &ActorId,
        reason: &str,
        revoked_at: i64,
    ) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Approvals
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a vote. Returns [`ApprovalInsert::Duplicate`] if this
    /// approver already voted on this request.
    async fn insert_approval(&self, approval: &Approval) -> Result<ApprovalInsert>;

    /// Count votes recorded for a request.
    async fn count_approvals(&self, request_id: &RequestId) -> Result<u32>;

    /// List votes for a request, oldest first.
    async fn list_approvals(&self, request_id: &RequestId) -> Result<Vec<Approval>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Key Material
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist key material issued at activation.
    async fn insert_key_material(&self, key: &KeyMaterial) -> Result<()>;

    /// Get the key material for a request, if any was issued.
    async fn get_key_material(&self, request_id: &RequestId) -> Result<Option<KeyMaterial>>;

    /// Set `is_active = false` on the request's key material. Idempotent;
    /// the rows are retained for audit.
    async fn deactivate_key_material(&self, request_id: &RequestId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an audit entry. Entries are immutable once written.
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Query audit entries, conjunctive filters, most-recent-first,
    /// capped at `limit`.
    async fn query_audit(&self, filter: &AuditFilter, limit: usize) -> Result<Vec<AuditEntry>>;
}
