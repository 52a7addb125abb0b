//! End-to-end lifecycle tests over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use breakglass::{EngineError, NoopScheduler};
use breakglass_core::{
    AccessRequest, ActorId, RequestId, RequestStatus, Role, SubjectId, Urgency,
};
use breakglass_store::Store;
use breakglass_testkit::{request_input, EngineFixture};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn critical_request_activates_on_first_approval() {
    let fx = EngineFixture::without_timers();

    let outcome = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 4), None)
        .await
        .unwrap();
    assert!(outcome.requires_approval);
    assert_eq!(outcome.approvers_needed, 1);
    let request = outcome.request;
    assert_eq!(request.status, RequestStatus::Requested);

    let result = fx
        .engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "confirmed with charge nurse",
            None,
            None,
        )
        .await
        .unwrap();

    assert!(result.approved);
    assert_eq!(result.remaining_approvals, 0);
    let token = result.activation_key.unwrap();
    assert_eq!(token.len(), breakglass_keys::TOKEN_LEN);

    let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Active);
    assert!(stored.activated_at.is_some());

    let key = fx.store.get_key_material(&request.id).await.unwrap().unwrap();
    assert!(key.is_active);
    assert_eq!(key.valid_until, request.end_time);
}

#[tokio::test]
async fn medium_request_counts_down_three_approvals() {
    let fx = EngineFixture::without_timers();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Medium, 8), None)
        .await
        .unwrap().request;

    let approvers = [
        ("dr-yang", Role::Physician),
        ("sec-hunt", Role::SecurityOfficer),
    ];
    for (i, (approver, role)) in approvers.iter().enumerate() {
        let result = fx
            .engine
            .approve_emergency_access(
                &request.id,
                ActorId::new(*approver),
                *role,
                "seconded",
                None,
                None,
            )
            .await
            .unwrap();
        assert!(!result.approved);
        assert!(result.activation_key.is_none());
        assert_eq!(result.remaining_approvals as usize, 2 - i);
    }

    let result = fx
        .engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("admin-webber"),
            Role::Administrator,
            "final sign-off",
            None,
            None,
        )
        .await
        .unwrap();
    assert!(result.approved);
    assert!(result.activation_key.is_some());
}

#[tokio::test]
async fn duplicate_approver_is_rejected_even_after_activation() {
    let fx = EngineFixture::without_timers();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 4), None)
        .await
        .unwrap().request;

    fx.engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    let err = fx
        .engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok again",
            None,
            None,
        )
        .await
        .unwrap_err();
    // The request is active by now, but a repeat vote is reported as a
    // duplicate regardless of whether the first vote triggered activation.
    assert!(matches!(err, EngineError::DuplicateApprover(_)));
}

#[tokio::test]
async fn duplicate_approver_before_quorum() {
    let fx = EngineFixture::without_timers();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Medium, 8), None)
        .await
        .unwrap().request;

    fx.engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("dr-yang"),
            Role::Physician,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    let err = fx
        .engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("dr-yang"),
            Role::Physician,
            "ok again",
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateApprover(_)));
}

#[tokio::test]
async fn revoke_before_quorum_closes_the_request() {
    let fx = EngineFixture::without_timers();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::High, 8), None)
        .await
        .unwrap().request;

    let changed = fx
        .engine
        .revoke_emergency_access(&request.id, ActorId::new("sec-hunt"), "false alarm", None)
        .await
        .unwrap();
    assert!(changed);

    let err = fx
        .engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("dr-yang"),
            Role::Physician,
            "too late",
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RequestClosed(_)));

    // Second revocation is a safe no-op.
    let changed = fx
        .engine
        .revoke_emergency_access(&request.id, ActorId::new("admin-webber"), "again", None)
        .await
        .unwrap();
    assert!(!changed);
}

#[tokio::test]
async fn conflicting_active_access_is_rejected() {
    let fx = EngineFixture::without_timers();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 4), None)
        .await
        .unwrap().request;
    fx.engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    let err = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 4), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ConflictingActiveAccess(_)));

    // A different subject is unaffected.
    fx.engine
        .request_access(request_input("patient-23", Urgency::Critical, 4), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn duration_ceiling_is_per_urgency_tier() {
    let fx = EngineFixture::without_timers();

    let err = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Medium, 25), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::DurationExceeded {
            requested: 25,
            max: 24,
            ..
        }
    ));

    // Exactly at the ceiling is allowed.
    fx.engine
        .request_access(request_input("patient-17", Urgency::Medium, 24), None)
        .await
        .unwrap();

    // Critical allows up to 72h.
    fx.engine
        .request_access(request_input("patient-23", Urgency::Critical, 72), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_subject_and_unprivileged_requester_are_rejected() {
    let fx = EngineFixture::without_timers();

    let mut input = request_input("nobody", Urgency::High, 4);
    let err = fx.engine.request_access(input, None).await.unwrap_err();
    assert!(matches!(err, EngineError::SubjectNotFound(_)));

    input = request_input("patient-17", Urgency::High, 4);
    input.requester_id = ActorId::new("member-karev");
    let err = fx.engine.request_access(input, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientPermission(_)));

    input = request_input("patient-17", Urgency::High, 4);
    input.requester_id = ActorId::new("ghost");
    let err = fx.engine.request_access(input, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientPermission(_)));
}

#[tokio::test(start_paused = true)]
async fn activation_schedules_expiry() {
    init_tracing();
    let fx = EngineFixture::new();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 1), None)
        .await
        .unwrap().request;
    fx.engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    // Just before the window ends, still active.
    tokio::time::sleep(Duration::from_millis(3_599_000)).await;
    let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Active);

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Revoked);
    assert!(stored.revoked_by.as_ref().unwrap().is_system());
    assert_eq!(stored.revocation_reason.as_deref(), Some("expired"));

    let key = fx.store.get_key_material(&request.id).await.unwrap().unwrap();
    assert!(!key.is_active);
}

#[tokio::test(start_paused = true)]
async fn manual_revocation_wins_over_expiry() {
    init_tracing();
    let fx = EngineFixture::new();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 1), None)
        .await
        .unwrap().request;
    fx.engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    fx.engine
        .revoke_emergency_access(&request.id, ActorId::new("sec-hunt"), "incident over", None)
        .await
        .unwrap();

    // Let the scheduled expiry fire; it must not overwrite the manual
    // revocation.
    tokio::time::sleep(Duration::from_millis(3_700_000)).await;

    let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Revoked);
    assert_eq!(stored.revoked_by.as_ref().unwrap().as_str(), "sec-hunt");
    assert_eq!(stored.revocation_reason.as_deref(), Some("incident over"));

    // Exactly one revoke entry in the trail.
    let trail = fx
        .engine
        .get_emergency_audit_trail(None, None, 100)
        .await
        .unwrap();
    let revokes = trail
        .iter()
        .filter(|e| e.context["action"] == "revoke")
        .count();
    assert_eq!(revokes, 1);
}

#[tokio::test]
async fn concurrent_final_approvals_activate_exactly_once() {
    let fx = EngineFixture::without_timers();
    let engine = Arc::new(fx.engine);
    let request = engine
        .request_access(request_input("patient-17", Urgency::High, 8), None)
        .await
        .unwrap().request;

    // One vote in; two racing votes would each satisfy the threshold.
    engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("dr-yang"),
            Role::Physician,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    let e1 = engine.clone();
    let e2 = engine.clone();
    let id = request.id;
    let a = tokio::spawn(async move {
        e1.approve_emergency_access(
            &id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
    });
    let b = tokio::spawn(async move {
        e2.approve_emergency_access(
            &id,
            ActorId::new("admin-webber"),
            Role::Administrator,
            "ok",
            None,
            None,
        )
        .await
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let winners = results
        .iter()
        .filter(|r| matches!(r, Ok(res) if res.approved))
        .count();
    assert_eq!(winners, 1);
    for r in &results {
        if let Err(e) = r {
            assert!(matches!(e, EngineError::AlreadyActive(_)));
        }
    }

    let key = fx.store.get_key_material(&request.id).await.unwrap();
    assert!(key.is_some());
}

#[tokio::test]
async fn reconcile_revokes_overdue_actives() {
    let fx = EngineFixture::without_timers();

    // An active request whose window already passed. Built directly
    // against the store to get a past end time.
    let mut overdue = AccessRequest::new(request_input("patient-17", Urgency::Critical, 1));
    overdue.created_at -= 7_200_000;
    overdue.end_time -= 7_200_000;
    fx.store.insert_request(&overdue).await.unwrap();
    fx.store
        .transition_to_active(&overdue.id, overdue.created_at)
        .await
        .unwrap();

    // A request still inside its window.
    let live = fx
        .engine
        .request_access(request_input("patient-23", Urgency::Critical, 4), None)
        .await
        .unwrap().request;
    fx.engine
        .approve_emergency_access(
            &live.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    let expired = fx.engine.reconcile_pending_expiries().await.unwrap();
    assert_eq!(expired, 1);

    let stored = fx.store.get_request(&overdue.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Revoked);
    assert!(stored.revoked_by.as_ref().unwrap().is_system());

    let stored = fx.store.get_request(&live.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Active);
}

#[tokio::test]
async fn active_view_joins_directory_names_and_keys() {
    let fx = EngineFixture::without_timers();
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 4), None)
        .await
        .unwrap().request;
    fx.engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();

    let views = fx.engine.get_active_emergency_access(None).await.unwrap();
    assert_eq!(views.len(), 1);
    let view = &views[0];
    assert_eq!(view.request.id, request.id);
    assert_eq!(view.requester_name.as_deref(), Some("Dr. Meredith Grey"));
    assert_eq!(view.subject_name.as_deref(), Some("Ward 17 Patient"));
    assert!(view.key.as_ref().unwrap().is_active);
}

#[tokio::test]
async fn audit_trail_records_every_step_with_valid_proofs() {
    let fx = EngineFixture::without_timers();

    // A rejected request lands in the trail too.
    let err = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Medium, 25), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DurationExceeded { .. }));

    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::Critical, 4), None)
        .await
        .unwrap().request;
    fx.engine
        .approve_emergency_access(
            &request.id,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap();
    fx.engine
        .revoke_emergency_access(&request.id, ActorId::new("sec-hunt"), "done", None)
        .await
        .unwrap();

    let trail = fx
        .engine
        .get_emergency_audit_trail(Some(SubjectId::new("patient-17")), None, 100)
        .await
        .unwrap();

    let actions: Vec<&str> = trail
        .iter()
        .map(|e| e.context["action"].as_str().unwrap())
        .collect();
    // Most recent first.
    assert_eq!(actions, ["revoke", "activate", "approve", "request", "request"]);

    let failure = trail.last().unwrap();
    assert!(!failure.success);
    assert!(failure.error_message.as_ref().unwrap().contains("ceiling"));

    for entry in &trail {
        assert!(entry.verify_proof().unwrap());
    }
    assert!(fx.engine.verify_audit_trail(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_request_rejections_are_audited() {
    let fx = EngineFixture::without_timers();
    let missing = RequestId::generate();

    let err = fx
        .engine
        .approve_emergency_access(
            &missing,
            ActorId::new("sec-hunt"),
            Role::SecurityOfficer,
            "ok",
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RequestNotFound(_)));

    let err = fx
        .engine
        .revoke_emergency_access(&missing, ActorId::new("sec-hunt"), "done", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RequestNotFound(_)));

    let trail = fx
        .engine
        .get_emergency_audit_trail(None, None, 10)
        .await
        .unwrap();
    let actions: Vec<&str> = trail
        .iter()
        .map(|e| e.context["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["revoke", "approve"]);
    for entry in &trail {
        assert!(!entry.success);
        assert_eq!(entry.context["request_id"].as_str().unwrap(), missing.to_hex());
        assert!(entry.error_message.as_ref().unwrap().contains("not found"));
        assert!(entry.verify_proof().unwrap());
    }
}

#[tokio::test]
async fn reconcile_reschedules_surviving_windows() {
    // NoopScheduler at activation, then a real check that reconcile
    // revokes nothing when all windows are still open.
    let fx = EngineFixture::with_scheduler(Arc::new(NoopScheduler));
    let request = fx
        .engine
        .request_access(request_input("patient-17", Urgency::High, 8), None)
        .await
        .unwrap().request;
    for (approver, role) in [
        ("dr-yang", Role::Physician),
        ("sec-hunt", Role::SecurityOfficer),
    ] {
        fx.engine
            .approve_emergency_access(&request.id, ActorId::new(approver), role, "ok", None, None)
            .await
            .unwrap();
    }

    assert_eq!(fx.engine.reconcile_pending_expiries().await.unwrap(), 0);
    let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Active);
}
