//! Storage layer for the break-glass engine.
//!
//! Defines the `Store` trait that the engine programs against, plus two
//! implementations: `MemoryStore` for tests and ephemeral setups, and
//! `SqliteStore` for durable deployments. Both back the same contract:
//! conditional status transitions, a one-vote-per-approver constraint,
//! and at most one active request per subject, enforced at the data
//! layer so racing callers cannot observe a double activation.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ApprovalInsert, Store};
