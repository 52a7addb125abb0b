//! Tamper-evident audit ledger.
//!
//! Thin orchestration over the store's append-only audit log: builds
//! entries with their canonical-CBOR Blake3 proof, appends them, and
//! re-verifies proofs on read. A proof mismatch on a stored row means
//! the row was altered after the fact.

use std::sync::Arc;

use breakglass_core::{
    ActorId, AuditEntry, AuditFilter, EntryId, OrgId, SourceMeta, SubjectId,
};
use breakglass_store::Store;

use crate::error::Result;

/// One verification finding: an entry whose stored proof no longer
/// matches its payload.
#[derive(Debug, Clone)]
pub struct ProofMismatch {
    pub entry_id: EntryId,
    pub operation: String,
    pub created_at: i64,
}

/// Append and query operations over the audit log.
pub struct AuditLedger<S: Store> {
    store: Arc<S>,
}

impl<S: Store> AuditLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Build an entry, compute its proof, and append it.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        operation: &str,
        actor_id: ActorId,
        subject_id: Option<SubjectId>,
        organization_id: Option<OrgId>,
        context: serde_json::Value,
        success: bool,
        error_message: Option<String>,
        source: Option<SourceMeta>,
    ) -> Result<AuditEntry> {
        let entry = AuditEntry::new(
            operation,
            actor_id,
            subject_id,
            organization_id,
            context,
            success,
            error_message,
            source,
        )
        .map_err(breakglass_store::StoreError::from)?;

        self.store.append_audit(&entry).await?;
        Ok(entry)
    }

    /// Matching entries, most recent first.
    pub async fn query(&self, filter: &AuditFilter, limit: usize) -> Result<Vec<AuditEntry>> {
        Ok(self.store.query_audit(filter, limit).await?)
    }

    /// Re-verify proofs over the most recent `limit` matching entries.
    ///
    /// Returns the entries whose proofs fail. An empty result means the
    /// examined window is intact.
    pub async fn verify(&self, filter: &AuditFilter, limit: usize) -> Result<Vec<ProofMismatch>> {
        let entries = self.store.query_audit(filter, limit).await?;
        let mut mismatches = Vec::new();
        for entry in entries {
            let ok = entry
                .verify_proof()
                .map_err(breakglass_store::StoreError::from)?;
            if !ok {
                mismatches.push(ProofMismatch {
                    entry_id: entry.id,
                    operation: entry.operation.clone(),
                    created_at: entry.created_at,
                });
            }
        }
        Ok(mismatches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakglass_store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_query() {
        let store = Arc::new(MemoryStore::new());
        let ledger = AuditLedger::new(store);

        ledger
            .append(
                "emergency_access",
                ActorId::new("dr-grey"),
                Some(SubjectId::new("subject-1")),
                Some(OrgId::new("org-1")),
                json!({"action": "request"}),
                true,
                None,
                None,
            )
            .await
            .unwrap();

        let got = ledger.query(&AuditFilter::default(), 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].operation, "emergency_access");
        assert!(got[0].verify_proof().unwrap());
    }

    #[tokio::test]
    async fn test_verify_flags_tampered_entry() {
        let store = Arc::new(MemoryStore::new());
        let ledger = AuditLedger::new(store.clone());

        let entry = ledger
            .append(
                "emergency_access",
                ActorId::new("dr-grey"),
                None,
                None,
                json!({"action": "revoke"}),
                true,
                None,
                None,
            )
            .await
            .unwrap();

        // Clean window verifies.
        assert!(ledger
            .verify(&AuditFilter::default(), 10)
            .await
            .unwrap()
            .is_empty());

        // Forge a payload mutation behind the ledger's back.
        let mut forged = entry.clone();
        forged.success = false;
        forged.id = EntryId::generate();
        store.append_audit(&forged).await.unwrap();

        let mismatches = ledger.verify(&AuditFilter::default(), 10).await.unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].entry_id, forged.id);
    }
}
