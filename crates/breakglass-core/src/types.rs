//! Strong type definitions for the break-glass engine.
//!
//! All identifiers are newtypes to prevent misuse at compile time.
//! Entity ids are opaque 16-byte random values; directory-owned ids
//! (subjects, actors, organizations) are string newtypes because they
//! are minted by the external user directory, not by this subsystem.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Reserved actor identity for system-initiated operations (auto-expiry).
pub const SYSTEM_ACTOR: &str = "system";

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Generate a fresh random id.
            pub fn generate() -> Self {
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, CoreError> {
                let bytes = hex::decode(s)
                    .map_err(|e| CoreError::InvalidId(e.to_string()))?;
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| CoreError::InvalidId("expected 16 bytes".into()))?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

entity_id! {
    /// Identifier of one emergency-access case.
    RequestId
}

entity_id! {
    /// Identifier of a single approver vote.
    ApprovalId
}

entity_id! {
    /// Identifier of issued key material.
    KeyId
}

entity_id! {
    /// Identifier of an audit ledger entry.
    EntryId
}

macro_rules! directory_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a directory-assigned identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

directory_id! {
    /// The protected record owner.
    SubjectId
}

directory_id! {
    /// A requester, approver, or revoker identity from the user directory.
    ActorId
}

directory_id! {
    /// Organization scope for requests and audit queries.
    OrgId
}

impl ActorId {
    /// The reserved system identity used by the auto-expiry path.
    pub fn system() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }

    /// Whether this is the reserved system identity.
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ACTOR
    }
}

/// Urgency tier of an access request.
///
/// The tier fixes both the approval quorum and the maximum grantable
/// duration. The mappings are deliberately non-configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
}

impl Urgency {
    /// Distinct approver votes required before activation.
    pub const fn required_approvals(&self) -> u32 {
        match self {
            Urgency::Critical => 1,
            Urgency::High => 2,
            Urgency::Medium => 3,
        }
    }

    /// Maximum requestable duration in hours.
    pub const fn max_duration_hours(&self) -> u32 {
        match self {
            Urgency::Critical => 72,
            Urgency::High => 48,
            Urgency::Medium => 24,
        }
    }

    /// Stable string form used in storage and audit contexts.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::High => "high",
            Urgency::Medium => "medium",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "critical" => Ok(Urgency::Critical),
            "high" => Ok(Urgency::High),
            "medium" => Ok(Urgency::Medium),
            other => Err(CoreError::InvalidEnum {
                kind: "urgency",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason category for an emergency-access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    MedicalEmergency,
    TechnicalSupport,
    DataRecovery,
    AuditInvestigation,
}

impl AccessType {
    /// Stable string form used in storage and audit contexts.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AccessType::MedicalEmergency => "medical_emergency",
            AccessType::TechnicalSupport => "technical_support",
            AccessType::DataRecovery => "data_recovery",
            AccessType::AuditInvestigation => "audit_investigation",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "medical_emergency" => Ok(AccessType::MedicalEmergency),
            "technical_support" => Ok(AccessType::TechnicalSupport),
            "data_recovery" => Ok(AccessType::DataRecovery),
            "audit_investigation" => Ok(AccessType::AuditInvestigation),
            other => Err(CoreError::InvalidEnum {
                kind: "access_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status of an access request.
///
/// ```text
/// Requested --(quorum reached)--> Active --(expiry or revoke)--> Revoked
/// Requested --(revoke before quorum)--> Revoked
/// ```
///
/// There is no path out of `Revoked`; a new request must be created.
/// Auto-expiry converges on `Revoked` with the system actor as revoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Requested,
    Active,
    Revoked,
}

impl RequestStatus {
    /// Whether this status is terminal.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Revoked)
    }

    /// Stable string form used in storage.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Requested => "requested",
            RequestStatus::Active => "active",
            RequestStatus::Revoked => "revoked",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "requested" => Ok(RequestStatus::Requested),
            "active" => Ok(RequestStatus::Active),
            "revoked" => Ok(RequestStatus::Revoked),
            other => Err(CoreError::InvalidEnum {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Directory role of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Physician,
    SecurityOfficer,
    SupportEngineer,
    Auditor,
    Administrator,
    Member,
}

impl Role {
    /// Whether this role is on the fixed allow-list for filing
    /// emergency-access requests. Ordinary members are not.
    pub const fn may_request_emergency_access(&self) -> bool {
        !matches!(self, Role::Member)
    }

    /// Stable string form used in storage and audit contexts.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Physician => "physician",
            Role::SecurityOfficer => "security_officer",
            Role::SupportEngineer => "support_engineer",
            Role::Auditor => "auditor",
            Role::Administrator => "administrator",
            Role::Member => "member",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "physician" => Ok(Role::Physician),
            "security_officer" => Ok(Role::SecurityOfficer),
            "support_engineer" => Ok(Role::SupportEngineer),
            "auditor" => Ok(Role::Auditor),
            "administrator" => Ok(Role::Administrator),
            "member" => Ok(Role::Member),
            other => Err(CoreError::InvalidEnum {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Get current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
