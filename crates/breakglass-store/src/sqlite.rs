//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the break-glass engine. It
//! uses rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking. The uniqueness and conditional-transition
//! guarantees of the trait map directly onto SQL: `INSERT OR IGNORE`
//! against the vote constraint, and single `UPDATE ... WHERE status`
//! statements for the state transitions.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use breakglass_core::{
    AccessRequest, AccessType, ActorId, Approval, ApprovalId, AuditEntry, AuditFilter, Blake3Hash,
    EntryId, KeyId, KeyMaterial, OrgId, RequestId, RequestStatus, Role, SourceMeta, SubjectId,
    Urgency,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ApprovalInsert, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&guard)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

/// Map a parse failure onto rusqlite's conversion error for row mappers.
fn bad_column(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn blob_to_array<const N: usize>(idx: usize, bytes: Vec<u8>) -> rusqlite::Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, "blob".into(), Type::Blob))
}

const REQUEST_COLUMNS: &str = "request_id, subject_id, requester_id, reason, access_type, \
     urgency, justification, duration_hours, organization_id, status, created_at, end_time, \
     activated_at, revoked_at, revoked_by, revocation_reason";

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessRequest> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let access_type: String = row.get(4)?;
    let urgency: String = row.get(5)?;
    let status: String = row.get(9)?;
    let revoked_by: Option<String> = row.get(14)?;

    Ok(AccessRequest {
        id: RequestId::from_bytes(blob_to_array(0, id_bytes)?),
        subject_id: SubjectId::new(row.get::<_, String>(1)?),
        requester_id: ActorId::new(row.get::<_, String>(2)?),
        reason: row.get(3)?,
        access_type: AccessType::parse(&access_type).map_err(|e| bad_column(4, e))?,
        urgency: Urgency::parse(&urgency).map_err(|e| bad_column(5, e))?,
        justification: row.get(6)?,
        requested_duration_hours: row.get(7)?,
        organization_id: OrgId::new(row.get::<_, String>(8)?),
        status: RequestStatus::parse(&status).map_err(|e| bad_column(9, e))?,
        created_at: row.get(10)?,
        end_time: row.get(11)?,
        activated_at: row.get(12)?,
        revoked_at: row.get(13)?,
        revoked_by: revoked_by.map(ActorId::new),
        revocation_reason: row.get(15)?,
    })
}

fn row_to_approval(row: &rusqlite::Row<'_>) -> rusqlite::Result<Approval> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let request_bytes: Vec<u8> = row.get(1)?;
    let role: String = row.get(3)?;

    Ok(Approval {
        id: ApprovalId::from_bytes(blob_to_array(0, id_bytes)?),
        request_id: RequestId::from_bytes(blob_to_array(1, request_bytes)?),
        approver_id: ActorId::new(row.get::<_, String>(2)?),
        approver_role: Role::parse(&role).map_err(|e| bad_column(3, e))?,
        reason: row.get(4)?,
        signature: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyMaterial> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let request_bytes: Vec<u8> = row.get(1)?;
    let salt: Vec<u8> = row.get(2)?;
    let masked: Vec<u8> = row.get(3)?;

    Ok(KeyMaterial {
        id: KeyId::from_bytes(blob_to_array(0, id_bytes)?),
        request_id: RequestId::from_bytes(blob_to_array(1, request_bytes)?),
        salt: blob_to_array(2, salt)?,
        masked_key: blob_to_array(3, masked)?,
        valid_from: row.get(4)?,
        valid_until: row.get(5)?,
        use_count: row.get(6)?,
        max_uses: row.get(7)?,
        is_active: row.get::<_, i64>(8)? != 0,
    })
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let subject: Option<String> = row.get(3)?;
    let org: Option<String> = row.get(4)?;
    let context: String = row.get(5)?;
    let source_ip: Option<String> = row.get(8)?;
    let source_ua: Option<String> = row.get(9)?;
    let proof: Vec<u8> = row.get(10)?;

    let source = if source_ip.is_some() || source_ua.is_some() {
        Some(SourceMeta {
            ip_address: source_ip,
            user_agent: source_ua,
        })
    } else {
        None
    };

    Ok(AuditEntry {
        id: EntryId::from_bytes(blob_to_array(0, id_bytes)?),
        operation: row.get(1)?,
        actor_id: ActorId::new(row.get::<_, String>(2)?),
        subject_id: subject.map(SubjectId::new),
        organization_id: org.map(OrgId::new),
        context: serde_json::from_str(&context).map_err(|e| bad_column(5, e))?,
        success: row.get::<_, i64>(6)? != 0,
        error_message: row.get(7)?,
        source,
        proof: Blake3Hash::from_bytes(blob_to_array(10, proof)?),
        created_at: row.get(11)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_request(&self, request: &AccessRequest) -> Result<()> {
        let req = request.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO requests (
                    request_id, subject_id, requester_id, reason, access_type,
                    urgency, justification, duration_hours, organization_id,
                    status, created_at, end_time, activated_at, revoked_at,
                    revoked_by, revocation_reason
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    req.id.as_bytes().as_slice(),
                    req.subject_id.as_str(),
                    req.requester_id.as_str(),
                    req.reason,
                    req.access_type.as_str(),
                    req.urgency.as_str(),
                    req.justification,
                    req.requested_duration_hours,
                    req.organization_id.as_str(),
                    req.status.as_str(),
                    req.created_at,
                    req.end_time,
                    req.activated_at,
                    req.revoked_at,
                    req.revoked_by.as_ref().map(|a| a.as_str().to_string()),
                    req.revocation_reason,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<AccessRequest>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM requests WHERE request_id = ?1", REQUEST_COLUMNS),
                params![id.as_bytes().as_slice()],
                row_to_request,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_active_for_subject(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<AccessRequest>> {
        let subject = subject.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM requests WHERE subject_id = ?1 AND status = 'active'",
                    REQUEST_COLUMNS
                ),
                params![subject.as_str()],
                row_to_request,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_active(&self, organization: Option<&OrgId>) -> Result<Vec<AccessRequest>> {
        let organization = organization.cloned();
        self.with_conn(move |conn| {
            let requests = if let Some(org) = organization {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM requests
                     WHERE status = 'active' AND organization_id = ?1
                     ORDER BY created_at",
                    REQUEST_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![org.as_str()], row_to_request)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM requests WHERE status = 'active' ORDER BY created_at",
                    REQUEST_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], row_to_request)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            Ok(requests)
        })
        .await
    }

    async fn transition_to_active(&self, id: &RequestId, activated_at: i64) -> Result<bool> {
        let id = *id;
        self.with_conn(move |conn| {
            // The WHERE clause is the activation guard: only a Requested
            // row can move to Active, so concurrent winners are impossible.
            let changed = conn.execute(
                "UPDATE requests SET status = 'active', activated_at = ?2
                 WHERE request_id = ?1 AND status = 'requested'",
                params![id.as_bytes().as_slice(), activated_at],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn mark_revoked(
        &self,
        id: &RequestId,
        revoked_by: &ActorId,
        reason: &str,
        revoked_at: i64,
    ) -> Result<bool> {
        let id = *id;
        let revoked_by = revoked_by.clone();
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE requests SET status = 'revoked', revoked_at = ?2,
                        revoked_by = ?3, revocation_reason = ?4
                 WHERE request_id = ?1 AND status != 'revoked'",
                params![
                    id.as_bytes().as_slice(),
                    revoked_at,
                    revoked_by.as_str(),
                    reason,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn insert_approval(&self, approval: &Approval) -> Result<ApprovalInsert> {
        let vote = approval.clone();
        self.with_conn(move |conn| {
            // OR IGNORE defers to the UNIQUE(request_id, approver_id)
            // constraint; zero changed rows means a duplicate vote.
            let changed = conn.execute(
                "INSERT OR IGNORE INTO approvals (
                    approval_id, request_id, approver_id, approver_role,
                    reason, signature, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    vote.id.as_bytes().as_slice(),
                    vote.request_id.as_bytes().as_slice(),
                    vote.approver_id.as_str(),
                    vote.approver_role.as_str(),
                    vote.reason,
                    vote.signature,
                    vote.created_at,
                ],
            )?;
            Ok(if changed > 0 {
                ApprovalInsert::Inserted
            } else {
                ApprovalInsert::Duplicate
            })
        })
        .await
    }

    async fn count_approvals(&self, request_id: &RequestId) -> Result<u32> {
        let request_id = *request_id;
        self.with_conn(move |conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM approvals WHERE request_id = ?1",
                params![request_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    async fn list_approvals(&self, request_id: &RequestId) -> Result<Vec<Approval>> {
        let request_id = *request_id;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT approval_id, request_id, approver_id, approver_role,
                        reason, signature, created_at
                 FROM approvals WHERE request_id = ?1 ORDER BY created_at",
            )?;
            let approvals = stmt
                .query_map(params![request_id.as_bytes().as_slice()], row_to_approval)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(approvals)
        })
        .await
    }

    async fn insert_key_material(&self, key: &KeyMaterial) -> Result<()> {
        let key = key.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO key_material (
                    key_id, request_id, salt, masked_key, valid_from,
                    valid_until, use_count, max_uses, is_active
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    key.id.as_bytes().as_slice(),
                    key.request_id.as_bytes().as_slice(),
                    key.salt.as_slice(),
                    key.masked_key.as_slice(),
                    key.valid_from,
                    key.valid_until,
                    key.use_count,
                    key.max_uses,
                    key.is_active as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_key_material(&self, request_id: &RequestId) -> Result<Option<KeyMaterial>> {
        let request_id = *request_id;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT key_id, request_id, salt, masked_key, valid_from,
                        valid_until, use_count, max_uses, is_active
                 FROM key_material WHERE request_id = ?1",
                params![request_id.as_bytes().as_slice()],
                row_to_key,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn deactivate_key_material(&self, request_id: &RequestId) -> Result<()> {
        let request_id = *request_id;
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE key_material SET is_active = 0 WHERE request_id = ?1",
                params![request_id.as_bytes().as_slice()],
            )?;
            Ok(())
        })
        .await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let entry = entry.clone();
        let context = serde_json::to_string(&entry.context)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (
                    entry_id, operation, actor_id, subject_id, organization_id,
                    context, success, error_message, source_ip,
                    source_user_agent, proof, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    entry.id.as_bytes().as_slice(),
                    entry.operation,
                    entry.actor_id.as_str(),
                    entry.subject_id.as_ref().map(|s| s.as_str().to_string()),
                    entry.organization_id.as_ref().map(|o| o.as_str().to_string()),
                    context,
                    entry.success as i64,
                    entry.error_message,
                    entry.source.as_ref().and_then(|s| s.ip_address.clone()),
                    entry.source.as_ref().and_then(|s| s.user_agent.clone()),
                    entry.proof.as_bytes().as_slice(),
                    entry.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn query_audit(&self, filter: &AuditFilter, limit: usize) -> Result<Vec<AuditEntry>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut sql = String::from(
                "SELECT entry_id, operation, actor_id, subject_id, organization_id,
                        context, success, error_message, source_ip,
                        source_user_agent, proof, created_at
                 FROM audit_log WHERE 1=1",
            );
            let mut args: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(ops) = &filter.operations {
                let placeholders = vec!["?"; ops.len()].join(", ");
                sql.push_str(&format!(" AND operation IN ({})", placeholders));
                for op in ops {
                    args.push(Box::new(op.clone()));
                }
            }
            if let Some(subject) = &filter.subject_id {
                sql.push_str(" AND subject_id = ?");
                args.push(Box::new(subject.as_str().to_string()));
            }
            if let Some(org) = &filter.organization_id {
                sql.push_str(" AND organization_id = ?");
                args.push(Box::new(org.as_str().to_string()));
            }
            sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?");
            args.push(Box::new(limit as i64));

            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params_from_iter(args), row_to_audit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }
}
