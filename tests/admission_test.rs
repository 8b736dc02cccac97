//! Admission decisions as seen through batch issuance and the decision log.

mod common;

use chrono::Duration;
use prometheus_tier_scheduler::config::AuthorizationLevel;
use prometheus_tier_scheduler::core::{DecisionLog, OutcomeEvent, OutcomeKind, OutcomeStore, PriorityClass, ReplyIntent};

use common::{at, config, population, Harness};

fn contacted(h: &Harness, class: PriorityClass, first_id: u64, count: u64) {
    for id in first_id..first_id + count {
        h.outcomes
            .append(OutcomeEvent { entity_id: id, class, kind: OutcomeKind::Contacted, at: at(10, 0) - Duration::days(1) })
            .unwrap();
    }
}

fn outcome(h: &Harness, class: PriorityClass, id: u64, kind: OutcomeKind) {
    h.outcomes
        .append(OutcomeEvent { entity_id: id, class, kind, at: at(10, 0) - Duration::days(1) })
        .unwrap();
}

#[test]
fn opt_out_rate_over_ceiling_halts_class() {
    let h = Harness::classified(config(20), population(PriorityClass::C, 1, 10));
    contacted(&h, PriorityClass::C, 1_000, 50);
    for id in 1_000..1_003 {
        outcome(&h, PriorityClass::C, id, OutcomeKind::OptedOut);
    }

    let batch = h.engine.orchestrator.get_next_batch(5, at(10, 0)).unwrap();
    assert!(batch.is_empty());
    let decision = &batch.decisions[0];
    assert!(!decision.approved);
    assert_eq!(decision.class, PriorityClass::C);
    assert_eq!(decision.reason, "stop_loss: opt-out rate 6.0% exceeds 5.0%");
    assert_eq!(decision.max_leads, 0);

    let logged = h.engine.decisions.latest(PriorityClass::C, batch.day).unwrap().unwrap();
    assert_eq!(logged.decision_id, decision.decision_id);
    assert_eq!(logged.violated().map(|c| c.rule.as_str()).collect::<Vec<_>>(), vec!["stop_loss"]);
}

#[test]
fn negative_response_rate_over_ceiling_halts_class() {
    let h = Harness::classified(config(20), population(PriorityClass::B, 1, 10));
    contacted(&h, PriorityClass::B, 1_000, 20);
    for id in 1_000..1_004 {
        outcome(&h, PriorityClass::B, id, OutcomeKind::Responded { intent: ReplyIntent::Negative });
    }
    let batch = h.engine.orchestrator.get_next_batch(5, at(10, 0)).unwrap();
    assert!(batch.is_empty());
    assert_eq!(batch.decisions[0].reason, "stop_loss: negative-response rate 20.0% exceeds 15.0%");
}

#[test]
fn old_opt_outs_fall_out_of_the_window() {
    let h = Harness::classified(config(20), population(PriorityClass::C, 1, 10));
    for id in 1_000..1_050 {
        h.outcomes
            .append(OutcomeEvent {
                entity_id: id,
                class: PriorityClass::C,
                kind: OutcomeKind::OptedOut,
                at: at(10, 0) - Duration::days(30),
            })
            .unwrap();
    }
    contacted(&h, PriorityClass::C, 1_000, 50);
    let batch = h.engine.orchestrator.get_next_batch(5, at(10, 0)).unwrap();
    assert_eq!(batch.len(), 5);
}

#[test]
fn stop_loss_is_per_class() {
    let mut entities = population(PriorityClass::A, 1, 2);
    entities.extend(population(PriorityClass::C, 100, 4));
    let h = Harness::classified(config(20), entities);
    // Class C is unhealthy, class A is not.
    contacted(&h, PriorityClass::C, 1_000, 50);
    for id in 1_000..1_010 {
        outcome(&h, PriorityClass::C, id, OutcomeKind::OptedOut);
    }
    let orch = &h.engine.orchestrator;
    let first = orch.get_next_batch(5, at(10, 0)).unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.tickets.iter().all(|t| t.class == PriorityClass::A));
    assert!(first.decisions[0].approved);

    let second = orch.get_next_batch(5, at(10, 1)).unwrap();
    assert!(second.is_empty());
    assert_eq!(second.decisions[0].class, PriorityClass::C);
    assert!(second.decisions[0].reason.starts_with("stop_loss: opt-out rate 20.0%"));
}

#[test]
fn insufficient_authorization_blocks_lower_classes() {
    let mut cfg = config(20);
    cfg.authorization_level = AuthorizationLevel::Supervised;
    let h = Harness::classified(cfg, population(PriorityClass::B, 1, 3));
    let batch = h.engine.orchestrator.get_next_batch(5, at(10, 0)).unwrap();
    assert!(batch.is_empty());
    assert!(batch.decisions[0].reason.starts_with("authorization: insufficient authorization"));
    assert_eq!(batch.note.as_deref(), Some(batch.decisions[0].reason.as_str()));
}

#[test]
fn kill_switch_rejects_everything() {
    let mut cfg = config(20);
    cfg.engine_enabled = false;
    let h = Harness::classified(cfg, population(PriorityClass::A, 1, 3));
    let batch = h.engine.orchestrator.get_next_batch(5, at(10, 0)).unwrap();
    assert!(batch.is_empty());
    assert_eq!(batch.decisions[0].reason, "engine_enabled: engine disabled by kill switch");
}

#[test]
fn nothing_issued_outside_operating_hours() {
    let h = Harness::classified(config(20), population(PriorityClass::A, 1, 3));
    let batch = h.engine.orchestrator.get_next_batch(5, at(20, 0)).unwrap();
    assert!(batch.is_empty());
    assert!(batch.decisions[0].reason.starts_with("operating_hours: outside operating hours"));
}

#[test]
fn lowest_class_is_capped_to_its_share() {
    let h = Harness::classified(config(20), population(PriorityClass::C, 1, 30));
    let orch = &h.engine.orchestrator;
    let first = orch.get_next_batch(30, at(10, 0)).unwrap();
    assert_eq!(first.len(), 10);
    assert_eq!(first.decisions[0].max_leads, 10);
    // The share is of the day, not of each call.
    let second = orch.get_next_batch(30, at(10, 1)).unwrap();
    assert!(second.is_empty());
    assert!(second.decisions[0].reason.starts_with("budget: no budget"));
}

#[test]
fn every_evaluation_is_logged() {
    let h = Harness::classified(config(20), population(PriorityClass::A, 1, 3));
    let orch = &h.engine.orchestrator;
    orch.get_next_batch(1, at(10, 0)).unwrap();
    orch.get_next_batch(1, at(10, 1)).unwrap();
    let day = at(10, 0).date_naive();
    let history = h.engine.decisions.history(PriorityClass::A, day).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|d| d.approved && d.conditions.len() == 6));
    assert_eq!(history[0].reason, "approved: up to 1 entities");
}
