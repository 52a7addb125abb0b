//! Approval quorum tracking.
//!
//! Records votes and answers "is the threshold met" without side
//! effects beyond persisting the vote itself. Activation is the
//! engine's job; keeping it out of here makes the quorum check
//! independently testable and keeps the activation race confined to the
//! store's conditional transition.

use std::sync::Arc;

use breakglass_core::{ActorId, Approval, RequestId, RequestStatus, Role};
use breakglass_store::{ApprovalInsert, Store};

use crate::error::{EngineError, Result};

/// Result of recording one vote.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The persisted vote.
    pub approval: Approval,
    /// Whether this vote met the urgency threshold.
    pub quorum_reached: bool,
    /// Votes still needed after this one. Zero when quorum is reached.
    pub remaining_approvals: u32,
}

/// Vote recording and threshold evaluation over a shared store.
pub struct ApprovalQuorum<S: Store> {
    store: Arc<S>,
}

impl<S: Store> ApprovalQuorum<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record one approver's vote on a request.
    ///
    /// Rejects second votes by the same approver before anything else,
    /// even on requests that have since activated or closed, then
    /// rejects votes on non-pending requests. The duplicate check under
    /// concurrency rides on the store's uniqueness constraint, so
    /// concurrent duplicate votes cannot both land.
    pub async fn record_approval(
        &self,
        request_id: &RequestId,
        approver_id: ActorId,
        approver_role: Role,
        reason: &str,
        signature: Option<String>,
    ) -> Result<ApprovalOutcome> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(EngineError::RequestNotFound(*request_id))?;

        let prior = self.store.list_approvals(request_id).await?;
        if prior.iter().any(|vote| vote.approver_id == approver_id) {
            return Err(EngineError::DuplicateApprover(approver_id));
        }

        match request.status {
            RequestStatus::Requested => {}
            RequestStatus::Active => return Err(EngineError::AlreadyActive(*request_id)),
            RequestStatus::Revoked => return Err(EngineError::RequestClosed(*request_id)),
        }

        let approval = Approval::new(*request_id, approver_id, approver_role, reason, signature);
        match self.store.insert_approval(&approval).await? {
            ApprovalInsert::Inserted => {}
            ApprovalInsert::Duplicate => {
                return Err(EngineError::DuplicateApprover(approval.approver_id));
            }
        }

        let votes = self.store.count_approvals(request_id).await?;
        let threshold = request.urgency.required_approvals();

        Ok(ApprovalOutcome {
            approval,
            quorum_reached: votes >= threshold,
            remaining_approvals: threshold.saturating_sub(votes),
        })
    }

    /// All votes recorded for a request, oldest first.
    pub async fn list_approvals(&self, request_id: &RequestId) -> Result<Vec<Approval>> {
        Ok(self.store.list_approvals(request_id).await?)
    }
}
