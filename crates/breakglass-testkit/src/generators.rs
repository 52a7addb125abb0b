//! Proptest strategies for engine inputs.

use proptest::prelude::*;

use breakglass_core::{
    AccessRequestInput, AccessType, ActorId, OrgId, Role, SubjectId, Urgency,
};

pub fn urgency() -> impl Strategy<Value = Urgency> {
    prop_oneof![
        Just(Urgency::Critical),
        Just(Urgency::High),
        Just(Urgency::Medium),
    ]
}

pub fn access_type() -> impl Strategy<Value = AccessType> {
    prop_oneof![
        Just(AccessType::MedicalEmergency),
        Just(AccessType::TechnicalSupport),
        Just(AccessType::DataRecovery),
        Just(AccessType::AuditInvestigation),
    ]
}

pub fn approver_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Physician),
        Just(Role::SecurityOfficer),
        Just(Role::SupportEngineer),
        Just(Role::Auditor),
        Just(Role::Administrator),
    ]
}

pub fn id_string() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{2,23}"
}

/// Three to six approvers with distinct ids, covering every quorum
/// threshold.
pub fn distinct_approvers() -> impl Strategy<Value = Vec<(ActorId, Role)>> {
    prop::collection::hash_set(id_string(), 3..=6).prop_flat_map(|ids| {
        let ids: Vec<String> = ids.into_iter().collect();
        prop::collection::vec(approver_role(), ids.len()).prop_map(move |roles| {
            ids.iter().map(|id| ActorId::new(id.clone())).zip(roles).collect()
        })
    })
}

/// Inputs whose duration stays within the tier ceiling.
pub fn valid_request_input() -> impl Strategy<Value = AccessRequestInput> {
    (urgency(), access_type(), id_string(), id_string(), id_string()).prop_flat_map(
        |(urgency, access_type, subject, requester, org)| {
            (1..=urgency.max_duration_hours()).prop_map(move |hours| AccessRequestInput {
                subject_id: SubjectId::new(subject.clone()),
                requester_id: ActorId::new(requester.clone()),
                reason: "generated".into(),
                access_type,
                urgency,
                justification: "generated".into(),
                requested_duration_hours: hours,
                organization_id: OrgId::new(org.clone()),
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakglass_core::AccessRequest;

    proptest! {
        #[test]
        fn prop_generated_inputs_respect_the_ceiling(input in valid_request_input()) {
            let hours = input.requested_duration_hours;
            let request = AccessRequest::new(input);
            prop_assert!(!request.exceeds_duration_ceiling());
            prop_assert_eq!(
                request.end_time - request.created_at,
                i64::from(hours) * 3_600_000
            );
        }
    }
}
