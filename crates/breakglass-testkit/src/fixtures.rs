//! Canned engines, directories, and request inputs for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use breakglass::{
    Directory, DirectoryError, EmergencyAccessEngine, EngineConfig, NoopScheduler, Scheduler,
    SubjectRecord, TokioScheduler, UserRecord,
};
use breakglass_core::{
    AccessRequestInput, AccessType, ActorId, OrgId, Role, SubjectId, Urgency,
};
use breakglass_keys::{KeyDerivation, MasterSecret};
use breakglass_store::MemoryStore;

/// In-memory directory backed by two maps. Unlisted ids resolve to
/// `None`, never to an error.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    users: HashMap<ActorId, UserRecord>,
    subjects: HashMap<SubjectId, SubjectRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, role: Role, display_name: &str) -> Self {
        let id = ActorId::new(id);
        self.users.insert(
            id.clone(),
            UserRecord {
                id,
                role,
                display_name: display_name.to_string(),
            },
        );
        self
    }

    pub fn with_subject(mut self, id: &str, display_name: &str) -> Self {
        let id = SubjectId::new(id);
        self.subjects.insert(
            id.clone(),
            SubjectRecord {
                id,
                display_name: display_name.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_user(&self, id: &ActorId) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.users.get(id).cloned())
    }

    async fn find_subject(&self, id: &SubjectId) -> Result<Option<SubjectRecord>, DirectoryError> {
        Ok(self.subjects.get(id).cloned())
    }
}

/// The standard cast of characters for fixture directories.
pub fn hospital_directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_user("dr-grey", Role::Physician, "Dr. Meredith Grey")
        .with_user("dr-yang", Role::Physician, "Dr. Cristina Yang")
        .with_user("sec-hunt", Role::SecurityOfficer, "Owen Hunt")
        .with_user("admin-webber", Role::Administrator, "Richard Webber")
        .with_user("aud-bailey", Role::Auditor, "Miranda Bailey")
        .with_user("member-karev", Role::Member, "Alex Karev")
        .with_subject("patient-17", "Ward 17 Patient")
        .with_subject("patient-23", "Ward 23 Patient")
}

/// An engine over a fresh `MemoryStore` with the standard directory.
pub struct EngineFixture {
    pub engine: EmergencyAccessEngine<MemoryStore>,
    pub store: Arc<MemoryStore>,
}

impl EngineFixture {
    /// Fixture with real tokio timers driving expiry. Pair with
    /// `#[tokio::test(start_paused = true)]` for deterministic clocks.
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(TokioScheduler))
    }

    /// Fixture whose scheduler drops every task, for tests exercising
    /// the reconciliation path.
    pub fn without_timers() -> Self {
        Self::with_scheduler(Arc::new(NoopScheduler))
    }

    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = EmergencyAccessEngine::new(
            store.clone(),
            KeyDerivation::new(MasterSecret::new([7u8; 32])),
            Arc::new(hospital_directory()),
            scheduler,
            EngineConfig::default(),
        );
        Self { engine, store }
    }
}

impl Default for EngineFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A well-formed request against the standard directory.
pub fn request_input(subject: &str, urgency: Urgency, hours: u32) -> AccessRequestInput {
    AccessRequestInput {
        subject_id: SubjectId::new(subject),
        requester_id: ActorId::new("dr-grey"),
        reason: "patient unresponsive, records needed".into(),
        access_type: AccessType::MedicalEmergency,
        urgency,
        justification: "attending physician on call".into(),
        requested_duration_hours: hours,
        organization_id: OrgId::new("seattle-grace"),
    }
}
