//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! batch that transforms the schema from version N to N+1.

use rusqlite::Connection;

use breakglass_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Two invariants live in the schema itself rather than application code:
/// one vote per (request, approver), and at most one Active request per
/// subject (partial unique index).
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Access requests: one row per break-glass case, never deleted
        CREATE TABLE requests (
            request_id BLOB PRIMARY KEY,       -- 16 bytes
            subject_id TEXT NOT NULL,
            requester_id TEXT NOT NULL,
            reason TEXT NOT NULL,
            access_type TEXT NOT NULL,
            urgency TEXT NOT NULL,
            justification TEXT NOT NULL,
            duration_hours INTEGER NOT NULL,
            organization_id TEXT NOT NULL,
            status TEXT NOT NULL,              -- requested | active | revoked
            created_at INTEGER NOT NULL,       -- Unix ms
            end_time INTEGER NOT NULL,         -- Unix ms, fixed at creation
            activated_at INTEGER,
            revoked_at INTEGER,
            revoked_by TEXT,
            revocation_reason TEXT
        );

        -- Approver votes: immutable, one per (request, approver)
        CREATE TABLE approvals (
            approval_id BLOB PRIMARY KEY,      -- 16 bytes
            request_id BLOB NOT NULL,
            approver_id TEXT NOT NULL,
            approver_role TEXT NOT NULL,
            reason TEXT NOT NULL,
            signature TEXT NOT NULL,
            created_at INTEGER NOT NULL,

            UNIQUE(request_id, approver_id)
        );

        -- Issued key material: deactivated, never deleted
        CREATE TABLE key_material (
            key_id BLOB PRIMARY KEY,           -- 16 bytes
            request_id BLOB NOT NULL,
            salt BLOB NOT NULL,                -- 16 bytes
            masked_key BLOB NOT NULL,          -- 32 bytes
            valid_from INTEGER NOT NULL,
            valid_until INTEGER NOT NULL,      -- equals requests.end_time
            use_count INTEGER NOT NULL DEFAULT 0,
            max_uses INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        -- Append-only audit ledger
        CREATE TABLE audit_log (
            entry_id BLOB PRIMARY KEY,         -- 16 bytes
            operation TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            subject_id TEXT,
            organization_id TEXT,
            context TEXT NOT NULL,             -- JSON
            success INTEGER NOT NULL,
            error_message TEXT,
            source_ip TEXT,
            source_user_agent TEXT,
            proof BLOB NOT NULL,               -- 32 bytes, Blake3 over canonical payload
            created_at INTEGER NOT NULL
        );

        -- At most one Active request per subject
        CREATE UNIQUE INDEX idx_requests_active_subject
            ON requests(subject_id) WHERE status = 'active';

        -- Indexes for common queries
        CREATE INDEX idx_requests_subject_status ON requests(subject_id, status);
        CREATE INDEX idx_requests_org_status ON requests(organization_id, status);
        CREATE INDEX idx_approvals_request ON approvals(request_id);
        CREATE INDEX idx_key_material_request ON key_material(request_id);
        CREATE INDEX idx_audit_subject ON audit_log(subject_id);
        CREATE INDEX idx_audit_org ON audit_log(organization_id);
        CREATE INDEX idx_audit_created ON audit_log(created_at);
        "#,
    )?;

    Ok(())
}
