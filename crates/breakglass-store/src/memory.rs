//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Conditional
//! transitions and the vote-uniqueness check run under the write lock,
//! so they are atomic with respect to concurrent callers.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use breakglass_core::{
    AccessRequest, ActorId, Approval, AuditEntry, AuditFilter, KeyMaterial, OrgId, RequestId,
    RequestStatus, SubjectId,
};

use crate::error::Result;
use crate::traits::{ApprovalInsert, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Requests indexed by id.
    requests: HashMap<RequestId, AccessRequest>,

    /// Votes in insertion order.
    approvals: Vec<Approval>,

    /// Uniqueness index: (request_id, approver_id).
    voted: HashSet<(RequestId, ActorId)>,

    /// Key material indexed by owning request.
    keys: HashMap<RequestId, KeyMaterial>,

    /// Audit entries in append order.
    audit: Vec<AuditEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_request(&self, request: &AccessRequest) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<AccessRequest>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.requests.get(id).cloned())
    }

    async fn find_active_for_subject(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<AccessRequest>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .requests
            .values()
            .find(|r| r.subject_id == *subject && r.status == RequestStatus::Active)
            .cloned())
    }

    async fn list_active(&self, organization: Option<&OrgId>) -> Result<Vec<AccessRequest>> {
        let inner = self.inner.read().unwrap();
        let mut active: Vec<AccessRequest> = inner
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Active)
            .filter(|r| organization.map_or(true, |org| r.organization_id == *org))
            .cloned()
            .collect();
        active.sort_by_key(|r| r.created_at);
        Ok(active)
    }

    async fn transition_to_active(&self, id: &RequestId, activated_at: i64) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.requests.get_mut(id) {
            Some(req) if req.status == RequestStatus::Requested => {
                req.status = RequestStatus::Active;
                req.activated_at = Some(activated_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_revoked(
        &self,
        id: &RequestId,
        revoked_by: &ActorId,
        reason: &str,
        revoked_at: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.requests.get_mut(id) {
            Some(req) if req.status != RequestStatus::Revoked => {
                req.status = RequestStatus::Revoked;
                req.revoked_at = Some(revoked_at);
                req.revoked_by = Some(revoked_by.clone());
                req.revocation_reason = Some(reason.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_approval(&self, approval: &Approval) -> Result<ApprovalInsert> {
        let mut inner = self.inner.write().unwrap();
        let key = (approval.request_id, approval.approver_id.clone());
        if !inner.voted.insert(key) {
            return Ok(ApprovalInsert::Duplicate);
        }
        inner.approvals.push(approval.clone());
        Ok(ApprovalInsert::Inserted)
    }

    async fn count_approvals(&self, request_id: &RequestId) -> Result<u32> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .approvals
            .iter()
            .filter(|a| a.request_id == *request_id)
            .count() as u32)
    }

    async fn list_approvals(&self, request_id: &RequestId) -> Result<Vec<Approval>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .approvals
            .iter()
            .filter(|a| a.request_id == *request_id)
            .cloned()
            .collect())
    }

    async fn insert_key_material(&self, key: &KeyMaterial) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.keys.insert(key.request_id, key.clone());
        Ok(())
    }

    async fn get_key_material(&self, request_id: &RequestId) -> Result<Option<KeyMaterial>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.keys.get(request_id).cloned())
    }

    async fn deactivate_key_material(&self, request_id: &RequestId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(key) = inner.keys.get_mut(request_id) {
            key.is_active = false;
        }
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.audit.push(entry.clone());
        Ok(())
    }

    async fn query_audit(&self, filter: &AuditFilter, limit: usize) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .audit
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }
}
