//! Admission control: may a class be worked today, and how much of it.
//!
//! Rules are plain data in a [`RuleChain`]. Every rule runs on every
//! evaluation so the audit record is complete; the first failing rule
//! supplies the decision reason.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::core::audit::{ConditionResult, DecisionLog, PolicyDecision};
use crate::core::capacity::CapacityState;
use crate::core::error::EngineError;
use crate::core::metrics::SafetySignals;
use crate::core::types::PriorityClass;
use crate::util::clock;

/// Inputs to one admission evaluation.
#[derive(Debug, Clone)]
pub struct AdmissionContext<'a> {
    /// Class requested.
    pub class: PriorityClass,
    /// Calendar day requested.
    pub day: NaiveDate,
    /// Evaluation time.
    pub now: DateTime<Utc>,
    /// Entities the caller would like to issue.
    pub requested: u32,
    /// Engine configuration.
    pub config: &'a EngineConfig,
    /// Capacity state of the day.
    pub capacity: &'a CapacityState,
    /// Remaining eligible supply per class.
    pub remaining_by_class: &'a BTreeMap<PriorityClass, u32>,
    /// Trailing safety signals for the class, or why they could not be read.
    pub safety: Result<SafetySignals, String>,
}

/// Outcome of a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Whether the rule passed.
    pub passed: bool,
    /// Measured values and thresholds.
    pub detail: String,
    /// Volume cap imposed by the rule, if it imposes one.
    pub cap: Option<u32>,
}

impl RuleOutcome {
    fn pass(detail: impl Into<String>) -> Self {
        Self { passed: true, detail: detail.into(), cap: None }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self { passed: false, detail: detail.into(), cap: None }
    }
}

/// One admission rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionRule {
    /// Global kill switch.
    EngineEnabled,
    /// Inside local operating hours.
    OperatingHours,
    /// Operator authorization covers the class.
    Authorization,
    /// Every strictly higher class is exhausted.
    PriorityOrder,
    /// Opt-out and negative-response rates are under their ceilings.
    StopLoss,
    /// Requested volume fits the remaining daily budget.
    Budget,
}

impl AdmissionRule {
    /// Rule name as recorded in decisions.
    pub const fn name(self) -> &'static str {
        match self {
            Self::EngineEnabled => "engine_enabled",
            Self::OperatingHours => "operating_hours",
            Self::Authorization => "authorization",
            Self::PriorityOrder => "priority_order",
            Self::StopLoss => "stop_loss",
            Self::Budget => "budget",
        }
    }

    /// Evaluate the rule.
    pub fn evaluate(self, ctx: &AdmissionContext<'_>) -> RuleOutcome {
        match self {
            Self::EngineEnabled => engine_enabled(ctx),
            Self::OperatingHours => operating_hours(ctx),
            Self::Authorization => authorization(ctx),
            Self::PriorityOrder => priority_order(ctx),
            Self::StopLoss => stop_loss(ctx),
            Self::Budget => budget(ctx),
        }
    }
}

impl fmt::Display for AdmissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn engine_enabled(ctx: &AdmissionContext<'_>) -> RuleOutcome {
    if ctx.config.engine_enabled {
        RuleOutcome::pass("engine enabled")
    } else {
        RuleOutcome::fail("engine disabled by kill switch")
    }
}

fn operating_hours(ctx: &AdmissionContext<'_>) -> RuleOutcome {
    let hours = &ctx.config.operating_hours;
    let local = clock::local_hour(ctx.now, hours.utc_offset_minutes);
    let detail = format!("local hour {local:.2} vs window {}:00-{}:00", hours.start_hour, hours.end_hour);
    if hours.contains(local) {
        RuleOutcome::pass(detail)
    } else {
        RuleOutcome::fail(format!("outside operating hours: {detail}"))
    }
}

fn authorization(ctx: &AdmissionContext<'_>) -> RuleOutcome {
    let required = ctx.config.policy(ctx.class).min_authorization;
    let current = ctx.config.authorization_level;
    let detail = format!("level {current:?}, {} requires {required:?}", ctx.class);
    if current >= required {
        RuleOutcome::pass(detail)
    } else {
        RuleOutcome::fail(format!("insufficient authorization: {detail}"))
    }
}

fn priority_order(ctx: &AdmissionContext<'_>) -> RuleOutcome {
    let blocking: Vec<String> = ctx
        .class
        .higher()
        .filter_map(|h| {
            let remaining = ctx.remaining_by_class.get(&h).copied().unwrap_or(0);
            (remaining > 0).then(|| format!("{h} has {remaining} remaining"))
        })
        .collect();
    if blocking.is_empty() {
        RuleOutcome::pass(if ctx.class.is_top() { "top class" } else { "all higher classes exhausted" })
    } else {
        RuleOutcome::fail(blocking.join(", "))
    }
}

fn stop_loss(ctx: &AdmissionContext<'_>) -> RuleOutcome {
    let signals = match &ctx.safety {
        Ok(s) => s,
        Err(e) => return RuleOutcome::fail(format!("safety metrics unavailable: {e}")),
    };
    let min_sample = ctx.config.stop_loss_min_sample;
    if signals.contacted < min_sample {
        return RuleOutcome::pass(format!(
            "{} contacted in window, below sample of {min_sample}",
            signals.contacted
        ));
    }
    let policy = ctx.config.policy(ctx.class);
    let mut breaches = Vec::new();
    if signals.opt_out_rate > policy.opt_out_ceiling {
        breaches.push(format!(
            "opt-out rate {:.1}% exceeds {:.1}%",
            signals.opt_out_rate * 100.0,
            policy.opt_out_ceiling * 100.0
        ));
    }
    if signals.negative_response_rate > policy.negative_response_ceiling {
        breaches.push(format!(
            "negative-response rate {:.1}% exceeds {:.1}%",
            signals.negative_response_rate * 100.0,
            policy.negative_response_ceiling * 100.0
        ));
    }
    if breaches.is_empty() {
        RuleOutcome::pass(format!(
            "opt-out {:.1}% <= {:.1}%, negative-response {:.1}% <= {:.1}% over {} contacted",
            signals.opt_out_rate * 100.0,
            policy.opt_out_ceiling * 100.0,
            signals.negative_response_rate * 100.0,
            policy.negative_response_ceiling * 100.0,
            signals.contacted
        ))
    } else {
        RuleOutcome::fail(breaches.join("; "))
    }
}

/// Entities a class may still take today.
///
/// A class's share is measured against the pool it could have had today
/// (what is still available plus what it already consumed), so repeated
/// batches cannot each take the full fraction.
pub fn class_budget(capacity: &CapacityState, class: PriorityClass, cap_percent: u32) -> u32 {
    let available = capacity.available();
    let own = capacity.counters(class).contacted + capacity.reserved_for(class);
    let pool = u64::from(available) + u64::from(own);
    let share = pool * u64::from(cap_percent.min(100)) / 100;
    let share = u32::try_from(share).unwrap_or(u32::MAX);
    share.saturating_sub(own).min(available)
}

fn budget(ctx: &AdmissionContext<'_>) -> RuleOutcome {
    let percent = ctx.config.policy(ctx.class).daily_cap_percent;
    let cap = class_budget(ctx.capacity, ctx.class, percent);
    let granted = ctx.requested.min(cap);
    let detail = format!(
        "requested {}, available {} of {}, class cap {percent}% allows {cap}",
        ctx.requested,
        ctx.capacity.available(),
        ctx.capacity.daily_target
    );
    if cap == 0 {
        RuleOutcome::fail(format!("no budget: {detail}"))
    } else {
        RuleOutcome { passed: true, detail, cap: Some(granted) }
    }
}

/// Ordered list of rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChain {
    rules: Vec<AdmissionRule>,
}

impl Default for RuleChain {
    fn default() -> Self {
        Self {
            rules: vec![
                AdmissionRule::EngineEnabled,
                AdmissionRule::OperatingHours,
                AdmissionRule::Authorization,
                AdmissionRule::PriorityOrder,
                AdmissionRule::StopLoss,
                AdmissionRule::Budget,
            ],
        }
    }
}

impl RuleChain {
    /// Chain with an explicit order.
    pub fn new(rules: Vec<AdmissionRule>) -> Self {
        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[AdmissionRule] {
        &self.rules
    }

    /// Run every rule and build an (unlogged) decision.
    pub fn decide(&self, ctx: &AdmissionContext<'_>) -> PolicyDecision {
        let mut conditions = Vec::with_capacity(self.rules.len());
        let mut first_failure: Option<String> = None;
        let mut max_leads = ctx.requested;
        for rule in &self.rules {
            let outcome = rule.evaluate(ctx);
            if !outcome.passed && first_failure.is_none() {
                first_failure = Some(format!("{rule}: {}", outcome.detail));
            }
            if let Some(cap) = outcome.cap {
                max_leads = max_leads.min(cap);
            }
            conditions.push(ConditionResult {
                rule: rule.name().to_string(),
                passed: outcome.passed,
                detail: outcome.detail,
            });
        }
        let approved = first_failure.is_none();
        let reason = first_failure.unwrap_or_else(|| format!("approved: up to {max_leads} entities"));
        PolicyDecision {
            decision_id: Uuid::new_v4(),
            class: ctx.class,
            day: ctx.day,
            approved,
            reason,
            conditions,
            max_leads: if approved { max_leads } else { 0 },
            expires_at: clock::end_of_day(ctx.day, ctx.config.operating_hours.utc_offset_minutes),
            decided_at: ctx.now,
        }
    }
}

/// Evaluates the rule chain and appends every decision to the log.
#[derive(Clone)]
pub struct AdmissionController {
    chain: RuleChain,
    log: Arc<dyn DecisionLog>,
}

impl AdmissionController {
    /// Controller with the default chain.
    pub fn new(log: Arc<dyn DecisionLog>) -> Self {
        Self::with_chain(RuleChain::default(), log)
    }

    /// Controller with a custom chain.
    pub fn with_chain(chain: RuleChain, log: Arc<dyn DecisionLog>) -> Self {
        Self { chain, log }
    }

    /// Decision log.
    pub fn log(&self) -> &Arc<dyn DecisionLog> {
        &self.log
    }

    /// Evaluate the chain without recording anything.
    pub fn decide(&self, ctx: &AdmissionContext<'_>) -> PolicyDecision {
        let decision = self.chain.decide(ctx);
        if decision.approved {
            tracing::debug!(class = %ctx.class, day = %ctx.day, max_leads = decision.max_leads, "class admitted");
        } else {
            tracing::info!(class = %ctx.class, day = %ctx.day, reason = %decision.reason, "class rejected");
        }
        decision
    }

    /// Append decisions that took effect to the log.
    pub fn record(&self, decisions: &[PolicyDecision]) -> Result<(), EngineError> {
        for decision in decisions {
            self.log.append(decision.clone())?;
        }
        Ok(())
    }

    /// Evaluate and record a decision.
    pub fn evaluate(&self, ctx: &AdmissionContext<'_>) -> Result<PolicyDecision, EngineError> {
        let decision = self.decide(ctx);
        self.record(std::slice::from_ref(&decision))?;
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthorizationLevel;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig { authorization_level: AuthorizationLevel::Full, ..EngineConfig::default() }
    }

    fn ctx<'a>(
        class: PriorityClass,
        config: &'a EngineConfig,
        capacity: &'a CapacityState,
        remaining: &'a BTreeMap<PriorityClass, u32>,
    ) -> AdmissionContext<'a> {
        AdmissionContext {
            class,
            day: now().date_naive(),
            now: now(),
            requested: 20,
            config,
            capacity,
            remaining_by_class: remaining,
            safety: Ok(SafetySignals::default()),
        }
    }

    #[test]
    fn lowest_class_gets_half_of_the_pool() {
        let mut capacity = CapacityState::new(now().date_naive(), 50, now());
        assert_eq!(class_budget(&capacity, PriorityClass::C, 50), 25);
        assert_eq!(class_budget(&capacity, PriorityClass::A, 100), 50);
        capacity.used = 30;
        capacity.per_class.entry(PriorityClass::A).or_default().contacted = 20;
        capacity.per_class.entry(PriorityClass::C).or_default().contacted = 10;
        // pool = 20 available + 10 own -> share 15, 5 left for C
        assert_eq!(class_budget(&capacity, PriorityClass::C, 50), 5);
    }

    #[test]
    fn all_rules_recorded_and_first_failure_wins() {
        let mut cfg = config();
        cfg.engine_enabled = false;
        cfg.authorization_level = AuthorizationLevel::Manual;
        let capacity = CapacityState::new(now().date_naive(), 50, now());
        let remaining = BTreeMap::new();
        let decision = RuleChain::default().decide(&ctx(PriorityClass::A, &cfg, &capacity, &remaining));
        assert!(!decision.approved);
        assert_eq!(decision.conditions.len(), 6);
        assert!(decision.reason.starts_with("engine_enabled:"));
        assert_eq!(decision.violated().count(), 2);
        assert_eq!(decision.max_leads, 0);
    }

    #[test]
    fn reordered_chain_changes_reason() {
        let mut cfg = config();
        cfg.engine_enabled = false;
        cfg.authorization_level = AuthorizationLevel::Manual;
        let capacity = CapacityState::new(now().date_naive(), 50, now());
        let remaining = BTreeMap::new();
        let chain = RuleChain::new(vec![AdmissionRule::Authorization, AdmissionRule::EngineEnabled]);
        let decision = chain.decide(&ctx(PriorityClass::A, &cfg, &capacity, &remaining));
        assert!(decision.reason.starts_with("authorization:"));
    }

    #[test]
    fn higher_supply_blocks_lower_class() {
        let cfg = config();
        let capacity = CapacityState::new(now().date_naive(), 50, now());
        let remaining = BTreeMap::from([(PriorityClass::A, 3), (PriorityClass::B, 0)]);
        let decision = RuleChain::default().decide(&ctx(PriorityClass::B, &cfg, &capacity, &remaining));
        assert!(!decision.approved);
        assert_eq!(decision.reason, "priority_order: Class A has 3 remaining");
    }

    #[test]
    fn missing_metrics_fail_closed() {
        let cfg = config();
        let capacity = CapacityState::new(now().date_naive(), 50, now());
        let remaining = BTreeMap::new();
        let mut c = ctx(PriorityClass::A, &cfg, &capacity, &remaining);
        c.safety = Err("store down".into());
        let decision = RuleChain::default().decide(&c);
        assert!(!decision.approved);
        assert!(decision.reason.contains("safety metrics unavailable"));
    }

    #[test]
    fn small_samples_do_not_trip_stop_loss() {
        let cfg = config();
        let capacity = CapacityState::new(now().date_naive(), 50, now());
        let remaining = BTreeMap::new();
        let mut c = ctx(PriorityClass::C, &cfg, &capacity, &remaining);
        c.safety = Ok(SafetySignals { contacted: 4, opt_outs: 2, opt_out_rate: 0.5, ..SafetySignals::default() });
        assert!(AdmissionRule::StopLoss.evaluate(&c).passed);
    }

    #[test]
    fn only_recorded_decisions_reach_the_log() {
        let log = Arc::new(crate::core::audit::InMemoryDecisionLog::new());
        let controller = AdmissionController::new(log.clone());
        let cfg = config();
        let capacity = CapacityState::new(now().date_naive(), 50, now());
        let remaining = BTreeMap::new();
        let c = ctx(PriorityClass::A, &cfg, &capacity, &remaining);

        let draft = controller.decide(&c);
        assert!(log.history(PriorityClass::A, c.day).unwrap().is_empty());
        controller.record(&[draft.clone()]).unwrap();
        let logged = controller.evaluate(&c).unwrap();

        let history = log.history(PriorityClass::A, c.day).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].decision_id, draft.decision_id);
        assert_eq!(history[1].decision_id, logged.decision_id);
    }

    #[test]
    fn outside_hours_rejected() {
        let cfg = config();
        let capacity = CapacityState::new(now().date_naive(), 50, now());
        let remaining = BTreeMap::new();
        let mut c = ctx(PriorityClass::A, &cfg, &capacity, &remaining);
        c.now = Utc.with_ymd_and_hms(2024, 6, 3, 21, 0, 0).unwrap();
        let outcome = AdmissionRule::OperatingHours.evaluate(&c);
        assert!(!outcome.passed);
    }
}
