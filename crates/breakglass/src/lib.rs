//! # Breakglass
//!
//! Emergency ("break-glass") access engine: a requester opens a case
//! against a protected subject, a quorum of approvers sized by urgency
//! votes it through, activation issues time-bounded key material and an
//! out-of-band token, and the access ends by explicit revocation or
//! scheduled expiry. Every transition, including rejected ones, lands
//! in a tamper-evident audit log.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use breakglass::{EmergencyAccessEngine, EngineConfig, TokioScheduler};
//! use breakglass_keys::{KeyDerivation, MasterSecret};
//! use breakglass_store::SqliteStore;
//! # use breakglass::{Directory, DirectoryError, SubjectRecord, UserRecord};
//! # use breakglass_core::{ActorId, SubjectId};
//! # struct Idp;
//! # #[async_trait::async_trait]
//! # impl Directory for Idp {
//! #     async fn find_user(&self, _: &ActorId) -> Result<Option<UserRecord>, DirectoryError> { Ok(None) }
//! #     async fn find_subject(&self, _: &SubjectId) -> Result<Option<SubjectRecord>, DirectoryError> { Ok(None) }
//! # }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("breakglass.db")?);
//! let keys = KeyDerivation::new(MasterSecret::from_hex(&std::env::var("BREAKGLASS_SECRET")?)?);
//! let engine = EmergencyAccessEngine::new(
//!     store,
//!     keys,
//!     Arc::new(Idp),
//!     Arc::new(TokioScheduler),
//!     EngineConfig::default(),
//! );
//! engine.reconcile_pending_expiries().await?;
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod quorum;
pub mod scheduler;

pub use directory::{Directory, DirectoryError, SubjectRecord, UserRecord};
pub use engine::{
    ActiveAccessView, ApprovalResult, EmergencyAccessEngine, EngineConfig, RequestOutcome,
};
pub use error::{EngineError, Result};
pub use ledger::{AuditLedger, ProofMismatch};
pub use quorum::{ApprovalOutcome, ApprovalQuorum};
pub use scheduler::{NoopScheduler, ScheduledTask, Scheduler, TokioScheduler};
