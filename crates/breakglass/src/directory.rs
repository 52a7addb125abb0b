//! Directory seam: who the subjects and requesters are.
//!
//! The engine validates requesters and subjects against an external
//! user directory it does not own. This trait is the whole contract;
//! deployments back it with their identity provider, tests back it with
//! a static map.

use async_trait::async_trait;
use breakglass_core::{ActorId, Role, SubjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory lookup failed: {0}")]
    LookupFailed(String),
}

/// A requester or approver as the directory knows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: ActorId,
    pub role: Role,
    pub display_name: String,
}

/// A protected record owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRecord {
    pub id: SubjectId,
    pub display_name: String,
}

/// Read-only lookups against the deployment's user directory.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up an actor. `None` means the directory has never heard of
    /// them, which is distinct from a lookup failure.
    async fn find_user(&self, id: &ActorId) -> Result<Option<UserRecord>, DirectoryError>;

    /// Look up a subject.
    async fn find_subject(&self, id: &SubjectId) -> Result<Option<SubjectRecord>, DirectoryError>;
}
