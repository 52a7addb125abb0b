//! # Breakglass Core
//!
//! Core types for the break-glass emergency-access engine: strongly typed
//! identifiers, the four persisted entities (requests, approvals, key
//! material, audit entries), Blake3 hashing, and the canonical CBOR
//! encoding behind audit proofs.
//!
//! ## Key Types
//!
//! - [`AccessRequest`] - One emergency-access case and its lifecycle state
//! - [`Approval`] - One approver's immutable vote
//! - [`KeyMaterial`] - The time-bounded capability issued at activation
//! - [`AuditEntry`] - Append-only, tamper-evident audit record
//! - [`Urgency`] - Tier fixing quorum size and duration ceiling

pub mod approval;
pub mod audit;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod keymat;
pub mod request;
pub mod types;

pub use approval::{default_signature, Approval};
pub use audit::{AuditEntry, AuditFilter, SourceMeta, OP_EMERGENCY_ACCESS};
pub use canonical::{canonical_value_bytes, json_to_cbor};
pub use crypto::{random_bytes, Blake3Hash};
pub use error::CoreError;
pub use keymat::KeyMaterial;
pub use request::{AccessRequest, AccessRequestInput};
pub use types::{
    now_millis, AccessType, ActorId, ApprovalId, EntryId, KeyId, OrgId, RequestId, RequestStatus,
    Role, SubjectId, Urgency, SYSTEM_ACTOR,
};
