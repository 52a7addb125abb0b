//! The emergency-access engine.
//!
//! Orchestrates the request, approval, activation, and revocation
//! lifecycle over a shared store. Key derivation, quorum counting, and
//! audit appends are delegated to their components; the engine owns the
//! ordering, the precondition checks, and the expiry-scheduling
//! contract.

use std::sync::Arc;

use serde_json::json;

use breakglass_core::{
    now_millis, AccessRequest, AccessRequestInput, ActorId, AuditEntry, AuditFilter, KeyMaterial,
    OrgId, RequestId, Role, SourceMeta, SubjectId, OP_EMERGENCY_ACCESS,
};
use breakglass_keys::KeyDerivation;
use breakglass_store::Store;

use crate::directory::Directory;
use crate::error::{EngineError, Result};
use crate::ledger::{AuditLedger, ProofMismatch};
use crate::quorum::ApprovalQuorum;
use crate::scheduler::Scheduler;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether rejected operations are also written to the audit log.
    pub audit_failures: bool,
    /// Usage ceiling stamped on issued key material.
    pub key_max_uses: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audit_failures: true,
            key_max_uses: 100,
        }
    }
}

/// Result of opening a request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// The persisted request, in `Requested` status.
    pub request: AccessRequest,
    /// Always true in this design; the minimum threshold is one vote.
    pub requires_approval: bool,
    /// Votes needed to activate, fixed by the urgency tier.
    pub approvers_needed: u32,
}

/// Result of one approval vote, as seen by the caller.
#[derive(Debug, Clone)]
pub struct ApprovalResult {
    /// Whether this vote activated the request.
    pub approved: bool,
    /// The activation token, present only when this vote activated.
    pub activation_key: Option<String>,
    /// Votes still needed. Zero when activated.
    pub remaining_approvals: u32,
}

/// An active request joined with directory display data and its key.
#[derive(Debug, Clone)]
pub struct ActiveAccessView {
    pub request: AccessRequest,
    /// Requester display name, when the directory still knows them.
    pub requester_name: Option<String>,
    /// Subject display name, when the directory still knows them.
    pub subject_name: Option<String>,
    pub key: Option<KeyMaterial>,
}

/// Break-glass lifecycle orchestration.
///
/// All mutation goes through conditional transitions at the store, so
/// concurrent callers converge instead of double-activating or
/// double-revoking.
pub struct EmergencyAccessEngine<S: Store + 'static> {
    store: Arc<S>,
    quorum: ApprovalQuorum<S>,
    ledger: AuditLedger<S>,
    keys: KeyDerivation,
    directory: Arc<dyn Directory>,
    scheduler: Arc<dyn Scheduler>,
    config: EngineConfig,
}

impl<S: Store + 'static> EmergencyAccessEngine<S> {
    pub fn new(
        store: Arc<S>,
        keys: KeyDerivation,
        directory: Arc<dyn Directory>,
        scheduler: Arc<dyn Scheduler>,
        config: EngineConfig,
    ) -> Self {
        Self {
            quorum: ApprovalQuorum::new(store.clone()),
            ledger: AuditLedger::new(store.clone()),
            store,
            keys,
            directory,
            scheduler,
            config,
        }
    }

    /// Storage backend, for embedders that need direct reads.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a new emergency-access request.
    ///
    /// Validates the subject against the directory, the requester's
    /// role, the duration ceiling for the urgency tier, and that the
    /// subject has no currently active access. Every rejection is
    /// audited (unless configured off) before it is returned.
    pub async fn request_access(
        &self,
        input: AccessRequestInput,
        source: Option<SourceMeta>,
    ) -> Result<RequestOutcome> {
        let requester = input.requester_id.clone();
        let subject = input.subject_id.clone();
        let org = input.organization_id.clone();

        if let Err(e) = self.check_request_preconditions(&input).await {
            self.audit_failure(
                requester,
                Some(subject),
                Some(org),
                json!({
                    "action": "request",
                    "urgency": input.urgency.as_str(),
                    "requested_duration_hours": input.requested_duration_hours,
                }),
                &e,
                source,
            )
            .await;
            return Err(e);
        }

        let request = AccessRequest::new(input);
        self.store.insert_request(&request).await?;

        // A salted digest over the request identity goes into the audit
        // context; holders of the master secret can later tie the entry
        // to the request without the log storing anything reversible.
        let (digest, digest_salt) =
            self.keys
                .request_digest(&request.subject_id, &request.requester_id, &request.id);

        self.ledger
            .append(
                OP_EMERGENCY_ACCESS,
                requester,
                Some(subject),
                Some(org),
                json!({
                    "action": "request",
                    "request_id": request.id.to_hex(),
                    "access_type": request.access_type.as_str(),
                    "urgency": request.urgency.as_str(),
                    "reason": request.reason,
                    "justification": request.justification,
                    "requested_duration_hours": request.requested_duration_hours,
                    "end_time": request.end_time,
                    "request_digest": digest.to_hex(),
                    "digest_salt": hex::encode(digest_salt),
                }),
                true,
                None,
                source,
            )
            .await?;

        tracing::info!(
            request_id = %request.id,
            subject = %request.subject_id,
            urgency = %request.urgency,
            "emergency access requested"
        );

        let approvers_needed = request.urgency.required_approvals();
        Ok(RequestOutcome {
            request,
            requires_approval: true,
            approvers_needed,
        })
    }

    // Validated in order; the first failure wins.
    async fn check_request_preconditions(&self, input: &AccessRequestInput) -> Result<()> {
        if self
            .directory
            .find_subject(&input.subject_id)
            .await?
            .is_none()
        {
            return Err(EngineError::SubjectNotFound(input.subject_id.clone()));
        }

        if self
            .store
            .find_active_for_subject(&input.subject_id)
            .await?
            .is_some()
        {
            return Err(EngineError::ConflictingActiveAccess(input.subject_id.clone()));
        }

        let max = input.urgency.max_duration_hours();
        if input.requested_duration_hours > max {
            return Err(EngineError::DurationExceeded {
                urgency: input.urgency,
                requested: input.requested_duration_hours,
                max,
            });
        }

        let requester = self
            .directory
            .find_user(&input.requester_id)
            .await?
            .ok_or_else(|| EngineError::InsufficientPermission(input.requester_id.clone()))?;
        if !requester.role.may_request_emergency_access() {
            return Err(EngineError::InsufficientPermission(input.requester_id.clone()));
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Approval and Activation
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an approval vote; activates the request when this vote
    /// meets the urgency threshold.
    ///
    /// A second vote by the same approver fails with
    /// `DuplicateApprover` whether or not the first one activated.
    pub async fn approve_emergency_access(
        &self,
        request_id: &RequestId,
        approver_id: ActorId,
        approver_role: Role,
        reason: &str,
        signature: Option<String>,
        source: Option<SourceMeta>,
    ) -> Result<ApprovalResult> {
        let request = match self.store.get_request(request_id).await? {
            Some(request) => request,
            None => {
                let e = EngineError::RequestNotFound(*request_id);
                self.audit_failure(
                    approver_id,
                    None,
                    None,
                    json!({
                        "action": "approve",
                        "request_id": request_id.to_hex(),
                    }),
                    &e,
                    source,
                )
                .await;
                return Err(e);
            }
        };

        let outcome = match self
            .quorum
            .record_approval(request_id, approver_id.clone(), approver_role, reason, signature)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.audit_failure(
                    approver_id,
                    Some(request.subject_id.clone()),
                    Some(request.organization_id.clone()),
                    json!({
                        "action": "approve",
                        "request_id": request_id.to_hex(),
                    }),
                    &e,
                    source,
                )
                .await;
                return Err(e);
            }
        };

        self.ledger
            .append(
                OP_EMERGENCY_ACCESS,
                approver_id,
                Some(request.subject_id.clone()),
                Some(request.organization_id.clone()),
                json!({
                    "action": "approve",
                    "request_id": request_id.to_hex(),
                    "approval_id": outcome.approval.id.to_hex(),
                    "quorum_reached": outcome.quorum_reached,
                    "remaining_approvals": outcome.remaining_approvals,
                }),
                true,
                None,
                source.clone(),
            )
            .await?;

        if !outcome.quorum_reached {
            return Ok(ApprovalResult {
                approved: false,
                activation_key: None,
                remaining_approvals: outcome.remaining_approvals,
            });
        }

        let token = self.activate(&request, source).await?;
        Ok(ApprovalResult {
            approved: true,
            activation_key: Some(token),
            remaining_approvals: 0,
        })
    }

    /// Activate a request that just met quorum.
    ///
    /// The store transition is conditional on the request still being
    /// in `Requested`; of two racing activators exactly one wins, and
    /// the loser sees `AlreadyActive` with no key material written.
    async fn activate(&self, request: &AccessRequest, source: Option<SourceMeta>) -> Result<String> {
        let activated_at = now_millis();
        if !self
            .store
            .transition_to_active(&request.id, activated_at)
            .await?
        {
            return Err(EngineError::AlreadyActive(request.id));
        }

        let derived = self.keys.derive(
            &request.subject_id,
            &request.requester_id,
            &request.id,
            request.end_time,
        );

        let key = KeyMaterial::issue(
            request.id,
            derived.salt,
            derived.masked_key,
            activated_at,
            request.end_time,
            self.config.key_max_uses,
        );
        self.store.insert_key_material(&key).await?;

        self.schedule_expiry(request.id, request.end_time);

        self.ledger
            .append(
                OP_EMERGENCY_ACCESS,
                request.requester_id.clone(),
                Some(request.subject_id.clone()),
                Some(request.organization_id.clone()),
                json!({
                    "action": "activate",
                    "request_id": request.id.to_hex(),
                    "key_id": key.id.to_hex(),
                    "activation_token": derived.activation_token,
                    "activated_at": activated_at,
                    "end_time": request.end_time,
                }),
                true,
                None,
                source,
            )
            .await?;

        tracing::info!(
            request_id = %request.id,
            subject = %request.subject_id,
            end_time = request.end_time,
            "emergency access activated"
        );
        Ok(derived.activation_token)
    }

    fn schedule_expiry(&self, request_id: RequestId, end_time: i64) {
        let store = self.store.clone();
        self.scheduler.schedule_at(
            end_time,
            Box::pin(async move {
                match finalize_revocation(
                    store,
                    request_id,
                    ActorId::system(),
                    "expired".to_string(),
                    None,
                )
                .await
                {
                    Ok(true) => {
                        tracing::info!(request_id = %request_id, "emergency access expired");
                    }
                    // Manual revocation got there first.
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(
                            request_id = %request_id,
                            error = %e,
                            "expiry revocation failed"
                        );
                    }
                }
            }),
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Revocation and Expiry
    // ─────────────────────────────────────────────────────────────────────────

    /// Revoke a request, deactivating its key material.
    ///
    /// Converges with auto-expiry on the same conditional transition,
    /// so calling this on an already-revoked request is a safe no-op
    /// and returns `false`.
    pub async fn revoke_emergency_access(
        &self,
        request_id: &RequestId,
        revoked_by: ActorId,
        reason: &str,
        source: Option<SourceMeta>,
    ) -> Result<bool> {
        if self.store.get_request(request_id).await?.is_none() {
            let e = EngineError::RequestNotFound(*request_id);
            self.audit_failure(
                revoked_by,
                None,
                None,
                json!({
                    "action": "revoke",
                    "request_id": request_id.to_hex(),
                }),
                &e,
                source,
            )
            .await;
            return Err(e);
        }

        let changed = finalize_revocation(
            self.store.clone(),
            *request_id,
            revoked_by,
            reason.to_string(),
            source,
        )
        .await?;

        if !changed {
            tracing::warn!(request_id = %request_id, "revocation was a no-op, already revoked");
        }
        Ok(changed)
    }

    /// Revoke every active request whose window has passed, and
    /// re-schedule expiry for those still inside theirs.
    ///
    /// Run once at startup: timers do not survive a restart, so this
    /// sweep is what makes expiry durable.
    pub async fn reconcile_pending_expiries(&self) -> Result<u32> {
        let now = now_millis();
        let mut expired = 0u32;

        for request in self.store.list_active(None).await? {
            if request.is_past_end(now) {
                if finalize_revocation(
                    self.store.clone(),
                    request.id,
                    ActorId::system(),
                    "expired".to_string(),
                    None,
                )
                .await?
                {
                    expired += 1;
                }
            } else {
                self.schedule_expiry(request.id, request.end_time);
            }
        }

        if expired > 0 {
            tracing::info!(count = expired, "reconciled overdue emergency accesses");
        }
        Ok(expired)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// All currently active accesses, joined with directory display
    /// names and issued key material.
    pub async fn get_active_emergency_access(
        &self,
        organization: Option<&OrgId>,
    ) -> Result<Vec<ActiveAccessView>> {
        let mut views = Vec::new();
        for request in self.store.list_active(organization).await? {
            let requester_name = self
                .directory
                .find_user(&request.requester_id)
                .await?
                .map(|u| u.display_name);
            let subject_name = self
                .directory
                .find_subject(&request.subject_id)
                .await?
                .map(|s| s.display_name);
            let key = self.store.get_key_material(&request.id).await?;

            views.push(ActiveAccessView {
                request,
                requester_name,
                subject_name,
                key,
            });
        }
        Ok(views)
    }

    /// Emergency-access audit entries, most recent first.
    pub async fn get_emergency_audit_trail(
        &self,
        subject_id: Option<SubjectId>,
        organization_id: Option<OrgId>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let filter = AuditFilter {
            operations: Some(vec![OP_EMERGENCY_ACCESS.to_string()]),
            subject_id,
            organization_id,
        };
        self.ledger.query(&filter, limit).await
    }

    /// Re-verify audit proofs over the most recent `limit` entries.
    pub async fn verify_audit_trail(&self, limit: usize) -> Result<Vec<ProofMismatch>> {
        self.ledger.verify(&AuditFilter::default(), limit).await
    }

    // ─────────────────────────────────────────────────────────────────────────

    async fn audit_failure(
        &self,
        actor: ActorId,
        subject: Option<SubjectId>,
        organization: Option<OrgId>,
        context: serde_json::Value,
        error: &EngineError,
        source: Option<SourceMeta>,
    ) {
        if !self.config.audit_failures {
            return;
        }
        if let Err(e) = self
            .ledger
            .append(
                OP_EMERGENCY_ACCESS,
                actor,
                subject,
                organization,
                context,
                false,
                Some(error.to_string()),
                source,
            )
            .await
        {
            // The caller's error still propagates; losing the failure
            // entry must not mask it.
            tracing::error!(error = %e, "failed to audit a rejected operation");
        }
    }
}

/// Shared terminal transition for manual revocation and auto-expiry.
///
/// Conditional at the store: the first caller flips the request to
/// `Revoked`, deactivates its key material, and writes the audit entry;
/// later callers get `false` and touch nothing.
async fn finalize_revocation<S: Store + 'static>(
    store: Arc<S>,
    request_id: RequestId,
    revoked_by: ActorId,
    reason: String,
    source: Option<SourceMeta>,
) -> Result<bool> {
    let revoked_at = now_millis();
    if !store
        .mark_revoked(&request_id, &revoked_by, &reason, revoked_at)
        .await?
    {
        return Ok(false);
    }

    store.deactivate_key_material(&request_id).await?;

    let request = store.get_request(&request_id).await?;
    let (subject, organization) = match &request {
        Some(r) => (Some(r.subject_id.clone()), Some(r.organization_id.clone())),
        None => (None, None),
    };

    AuditLedger::new(store)
        .append(
            OP_EMERGENCY_ACCESS,
            revoked_by,
            subject,
            organization,
            json!({
                "action": "revoke",
                "request_id": request_id.to_hex(),
                "reason": reason,
                "revoked_at": revoked_at,
            }),
            true,
            None,
            source,
        )
        .await?;

    Ok(true)
}
