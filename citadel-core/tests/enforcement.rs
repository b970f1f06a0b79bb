//! End-to-end enforcement: engine decisions feeding the audit ledger.

use chrono::{DateTime, Duration, Utc};
use citadel_core::{
    ActionContext, ActionIntent, AuditLedger, AuditRecord, Capability, EntryKind, ErrorCode,
    LifecycleAction, Outcome, PendingAction, PolicyEngine, StepUpRequest, TrustLevel,
};

fn t0() -> DateTime<Utc> {
    "2026-02-01T09:00:00Z".parse().unwrap()
}

fn engine_with_writer() -> PolicyEngine {
    let mut engine = PolicyEngine::new();
    engine
        .registry_mut()
        .register(Capability::new("app.editor", TrustLevel::Verified).with_permission("fs.write"))
        .unwrap();
    engine
        .registry_mut()
        .transition("app.editor", LifecycleAction::Enable)
        .unwrap();
    engine
}

/// A capability holding `fs.write`, in state Enabled, issues 21 write intents
/// within one second: 1-20 are allowed, 21 is denied as rate-limited. All 21
/// decisions are appended; exactly one is a deny; the throttle counter reads 1.
#[test]
fn burst_of_writes_hits_the_rate_wall_once() {
    let mut engine = engine_with_writer();
    let mut ledger = AuditLedger::new();
    let intent = ActionIntent::fs_write("write");
    let start = t0();

    for i in 0..21u32 {
        // 21 calls spread inside a single 1000 ms window.
        let now = start + Duration::milliseconds(i as i64 * 40);
        let context = ActionContext::new(format!("cor_{i}")).with_scheme("user");
        let decision = engine.evaluate_at("app.editor", &intent, &context, now);

        if i < 20 {
            assert_eq!(decision.outcome, Outcome::Allow, "intent {}", i + 1);
        } else {
            assert_eq!(decision.outcome, Outcome::Deny, "intent 21 must be denied");
            assert_eq!(decision.error_code, Some(ErrorCode::RateLimited));
            assert!(decision.error_code.unwrap().retryable());
        }

        ledger
            .append_at(
                &AuditRecord {
                    capability_id: "app.editor".into(),
                    action: intent.name.clone(),
                    decision,
                },
                now,
            )
            .unwrap();
    }

    assert_eq!(ledger.len(), 21);
    let denies = ledger
        .entries()
        .iter()
        .filter(|e| {
            e.record()
                .map(|r| r.decision.outcome == Outcome::Deny)
                .unwrap_or(false)
        })
        .count();
    assert_eq!(denies, 1);

    let record = engine.registry().get("app.editor").unwrap();
    assert_eq!(record.throttle_count, 1);
    assert_eq!(record.deny_count, 1);

    ledger.verify_chain().unwrap();
}

#[test]
fn denied_burst_recovers_after_the_window() {
    let mut engine = engine_with_writer();
    let intent = ActionIntent::fs_write("write");
    let start = t0();

    for i in 0..20 {
        let context = ActionContext::new(format!("cor_{i}"));
        let now = start + Duration::milliseconds(i);
        assert!(engine.evaluate_at("app.editor", &intent, &context, now).is_allowed());
    }
    let denied = engine.evaluate_at(
        "app.editor",
        &intent,
        &ActionContext::new("cor_denied"),
        start + Duration::milliseconds(500),
    );
    assert_eq!(denied.error_code, Some(ErrorCode::RateLimited));

    // The same request is admitted once the window has slid past the burst.
    let retried = engine.evaluate_at(
        "app.editor",
        &intent,
        &ActionContext::new("cor_retry"),
        start + Duration::milliseconds(1_200),
    );
    assert_eq!(retried.outcome, Outcome::Allow);
}

#[test]
fn sensitive_flow_escalates_then_allows_after_step_up() {
    let mut engine = engine_with_writer();
    engine
        .registry_mut()
        .grant_permission("app.editor", "vault.export")
        .unwrap();
    let intent = ActionIntent::new(
        "export",
        "vault.export",
        citadel_core::AccessMode::Read,
        citadel_core::RateKind::ApiCall,
    );
    let context = ActionContext::new("cor_export").sensitive();
    let now = t0();

    let escalated = engine.evaluate_at("app.editor", &intent, &context, now);
    assert_eq!(escalated.outcome, Outcome::Escalate);
    assert_eq!(escalated.error_code, Some(ErrorCode::StepUpRequired));

    // The challenge UI drives the session to verified.
    let outcome = engine.stepup().request_at(
        PendingAction::new("Export the vault", "cor_export"),
        now,
    );
    assert_eq!(outcome, StepUpRequest::ChallengeRequired);
    engine.stepup().mark_challenge_shown();
    engine.stepup().verify_at(true, now);

    let allowed = engine.evaluate_at("app.editor", &intent, &context, now);
    assert_eq!(allowed.outcome, Outcome::Allow);

    // Once the TTL lapses the same action escalates again.
    let later = now + Duration::seconds(601);
    let expired = engine.evaluate_at("app.editor", &intent, &context, later);
    assert_eq!(expired.outcome, Outcome::Escalate);
}

#[test]
fn suspended_capability_is_denied_with_reason_chain() {
    let mut engine = engine_with_writer();
    engine
        .registry_mut()
        .transition("app.editor", LifecycleAction::Suspend)
        .unwrap();

    let decision = engine.evaluate_at(
        "app.editor",
        &ActionIntent::fs_write("write"),
        &ActionContext::new("cor_1"),
        t0(),
    );
    assert_eq!(decision.outcome, Outcome::Deny);
    assert_eq!(decision.error_code, Some(ErrorCode::CapabilityInvalidState));
    assert!(decision
        .reason_chain
        .iter()
        .any(|r| r.contains("suspended")));
    assert_eq!(decision.correlation_id, "cor_1");
}

#[test]
fn decision_and_rollback_share_one_chain() {
    let mut engine = engine_with_writer();
    let mut ledger = AuditLedger::new();
    let now = t0();

    let decision = engine.evaluate_at(
        "app.editor",
        &ActionIntent::fs_write("write"),
        &ActionContext::new("cor_1").with_scheme("user"),
        now,
    );
    assert!(decision.is_allowed());

    let entry_id = ledger
        .append_at(
            &AuditRecord {
                capability_id: "app.editor".into(),
                action: "write".into(),
                decision,
            },
            now,
        )
        .unwrap()
        .id
        .clone();

    let rollback = ledger
        .rollback_at(&entry_id, "user pressed undo", "cor_undo", now)
        .unwrap();
    assert_eq!(rollback.kind, EntryKind::Rollback);

    ledger.verify_chain().unwrap();
    assert_eq!(ledger.len(), 2);
}
