//! Error types for the engine.

use breakglass_core::{ActorId, RequestId, SubjectId, Urgency};
use breakglass_store::StoreError;
use thiserror::Error;

use crate::directory::DirectoryError;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("subject not found: {0}")]
    SubjectNotFound(SubjectId),

    #[error("request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("subject {0} already has an active emergency access")]
    ConflictingActiveAccess(SubjectId),

    #[error("requested {requested}h exceeds the {max}h ceiling for {urgency} urgency")]
    DurationExceeded {
        urgency: Urgency,
        requested: u32,
        max: u32,
    },

    #[error("actor {0} is not permitted to request emergency access")]
    InsufficientPermission(ActorId),

    #[error("approver {0} already voted on this request")]
    DuplicateApprover(ActorId),

    #[error("request {0} is already active")]
    AlreadyActive(RequestId),

    #[error("request {0} is closed and no longer accepts votes")]
    RequestClosed(RequestId),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
