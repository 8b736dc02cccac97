//! Per-class outcome metrics.
//!
//! Every rate is computed from one class's own counts. Cross-class figures
//! are limited to summed volumes and revenue in [`TopLine`], plus one
//! explicitly blended conversion rate that is never used as a class rate.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ClassPolicies;
use crate::core::error::EngineError;
use crate::core::store::{EntityFilter, EntityStore, OutcomeStore};
use crate::core::types::{EntityId, OutcomeEvent, OutcomeKind, PriorityClass};
use crate::util::money::Cents;

/// Weight of conversion in the class comparison score.
const CONVERSION_WEIGHT: f64 = 0.4;
/// Weight of normalized average deal size in the comparison score.
const DEAL_SIZE_WEIGHT: f64 = 0.6;
/// Minimum contacted per class before claiming a significant difference.
const MIN_COMPARISON_SAMPLE: u64 = 30;
/// Two-sided 95% critical value.
const Z_CRITICAL: f64 = 1.96;
/// Fraction of a stop-loss ceiling at which a warning insight is emitted.
const CEILING_WARNING_FRACTION: f64 = 0.8;

/// Aggregation period, trailing from the evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Last 24 hours.
    Day,
    /// Last 7 days.
    Week,
    /// Last 30 days.
    Month,
    /// Everything.
    AllTime,
}

impl Period {
    /// Start of the window ending at `as_of`; `None` for all time.
    pub fn since(self, as_of: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Day => Some(as_of - Duration::days(1)),
            Self::Week => Some(as_of - Duration::days(7)),
            Self::Month => Some(as_of - Duration::days(30)),
            Self::AllTime => None,
        }
    }
}

/// Funnel counts (distinct entities per stage).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funnel {
    /// Entities currently in the class.
    pub total: u64,
    /// Contacted at least once in the period.
    pub contacted: u64,
    /// Replied.
    pub responded: u64,
    /// Qualified.
    pub qualified: u64,
    /// Signed.
    pub contracted: u64,
    /// Closed.
    pub closed: u64,
}

/// Revenue figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revenue {
    /// Sum of expected values of entities in the class.
    pub expected_value_sum: Cents,
    /// Sum of realized revenue in the period.
    pub realized_sum: Cents,
    /// `realized_sum / closed`.
    pub average_deal_size: Cents,
}

/// Stage-to-stage ratios within one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    /// responded / contacted.
    pub response_rate: f64,
    /// qualified / responded.
    pub qualification_rate: f64,
    /// closed / qualified.
    pub close_rate: f64,
    /// closed / contacted.
    pub overall_conversion: f64,
}

/// Negative-signal counts and rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetySignals {
    /// Contacted entities the rates are measured against.
    pub contacted: u64,
    /// Distinct opt-outs.
    pub opt_outs: u64,
    /// Distinct negative responses.
    pub negative_responses: u64,
    /// opt_outs / contacted.
    pub opt_out_rate: f64,
    /// `negative_responses` / contacted.
    pub negative_response_rate: f64,
}

/// Share lost at each funnel step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DropOff {
    /// Contacted but never responded.
    pub contact_to_response: f64,
    /// Responded but never qualified.
    pub response_to_qualified: f64,
    /// Qualified but never signed.
    pub qualified_to_contracted: f64,
    /// Signed but never closed.
    pub contracted_to_closed: f64,
}

/// Metrics for one class over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetricsSnapshot {
    /// Class.
    pub class: PriorityClass,
    /// Period.
    pub period: Period,
    /// Funnel counts.
    pub funnel: Funnel,
    /// Revenue.
    pub revenue: Revenue,
    /// Ratios.
    pub efficiency: Efficiency,
    /// Safety signals.
    pub safety: SafetySignals,
    /// Drop-off per stage.
    pub drop_off: DropOff,
    /// Evaluation time.
    pub computed_at: DateTime<Utc>,
}

/// Summed cross-class volumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TopLine {
    /// Sum of per-class totals.
    pub total: u64,
    /// Sum of per-class contacted.
    pub contacted: u64,
    /// Sum of per-class closed.
    pub closed: u64,
    /// Sum of expected values.
    pub expected_value_sum: Cents,
    /// Sum of realized revenue.
    pub realized_sum: Cents,
    /// Pooled closed / contacted across classes. Not a class rate.
    pub blended_conversion_rate: f64,
}

/// One class's comparison score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    /// Class.
    pub class: PriorityClass,
    /// The class's own overall conversion.
    pub conversion: f64,
    /// Average deal size over the largest class average.
    pub normalized_deal_size: f64,
    /// Weighted score.
    pub score: f64,
}

/// Ranking plus plain-language insights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassComparison {
    /// Classes by descending score.
    pub ranking: Vec<ClassScore>,
    /// Observations for operators.
    pub insights: Vec<String>,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn drop_off(from: u64, to: u64) -> f64 {
    if from == 0 {
        0.0
    } else {
        1.0 - ratio(to, from)
    }
}

#[derive(Default)]
struct StageSets {
    contacted: HashSet<EntityId>,
    responded: HashSet<EntityId>,
    qualified: HashSet<EntityId>,
    contracted: HashSet<EntityId>,
    closed: HashSet<EntityId>,
    opted_out: HashSet<EntityId>,
    negative: HashSet<EntityId>,
    realized: Cents,
}

impl StageSets {
    fn collect<'a>(class: PriorityClass, events: impl IntoIterator<Item = &'a OutcomeEvent>) -> Self {
        let mut sets = Self::default();
        for event in events.into_iter().filter(|e| e.class == class) {
            let id = event.entity_id;
            match &event.kind {
                OutcomeKind::Contacted => {
                    sets.contacted.insert(id);
                }
                OutcomeKind::Responded { intent } => {
                    sets.responded.insert(id);
                    if intent.is_negative() {
                        sets.negative.insert(id);
                    }
                }
                OutcomeKind::Qualified => {
                    sets.qualified.insert(id);
                }
                OutcomeKind::Contracted => {
                    sets.contracted.insert(id);
                }
                OutcomeKind::Closed { realized } => {
                    sets.closed.insert(id);
                    sets.realized += *realized;
                }
                OutcomeKind::OptedOut => {
                    sets.opted_out.insert(id);
                }
            }
        }
        sets
    }

    fn count(set: &HashSet<EntityId>) -> u64 {
        u64::try_from(set.len()).unwrap_or(u64::MAX)
    }

    fn safety(&self) -> SafetySignals {
        let contacted = Self::count(&self.contacted);
        let opt_outs = Self::count(&self.opted_out);
        let negative_responses = Self::count(&self.negative);
        SafetySignals {
            contacted,
            opt_outs,
            negative_responses,
            opt_out_rate: ratio(opt_outs, contacted),
            negative_response_rate: ratio(negative_responses, contacted),
        }
    }
}

/// Computes class metrics from the entity and outcome stores.
#[derive(Clone)]
pub struct ClassMetricsAggregator {
    entities: Arc<dyn EntityStore>,
    outcomes: Arc<dyn OutcomeStore>,
}

impl ClassMetricsAggregator {
    /// Aggregator over the given stores.
    pub fn new(entities: Arc<dyn EntityStore>, outcomes: Arc<dyn OutcomeStore>) -> Self {
        Self { entities, outcomes }
    }

    /// Snapshot for one class.
    pub fn snapshot(
        &self,
        class: PriorityClass,
        period: Period,
        as_of: DateTime<Utc>,
    ) -> Result<ClassMetricsSnapshot, EngineError> {
        let events = self.outcomes.query(period.since(as_of), as_of)?;
        self.snapshot_from(class, period, as_of, &events)
    }

    fn snapshot_from(
        &self,
        class: PriorityClass,
        period: Period,
        as_of: DateTime<Utc>,
        events: &[OutcomeEvent],
    ) -> Result<ClassMetricsSnapshot, EngineError> {
        let members = self.entities.fetch_by_class(class, &EntityFilter::default())?;
        let sets = StageSets::collect(class, events);
        let funnel = Funnel {
            total: u64::try_from(members.len()).unwrap_or(u64::MAX),
            contacted: StageSets::count(&sets.contacted),
            responded: StageSets::count(&sets.responded),
            qualified: StageSets::count(&sets.qualified),
            contracted: StageSets::count(&sets.contracted),
            closed: StageSets::count(&sets.closed),
        };
        let revenue = Revenue {
            expected_value_sum: members.iter().map(crate::core::types::Entity::expected_value).sum(),
            realized_sum: sets.realized,
            average_deal_size: sets.realized.div_count(funnel.closed),
        };
        Ok(ClassMetricsSnapshot {
            class,
            period,
            funnel,
            revenue,
            efficiency: Efficiency {
                response_rate: ratio(funnel.responded, funnel.contacted),
                qualification_rate: ratio(funnel.qualified, funnel.responded),
                close_rate: ratio(funnel.closed, funnel.qualified),
                overall_conversion: ratio(funnel.closed, funnel.contacted),
            },
            safety: sets.safety(),
            drop_off: DropOff {
                contact_to_response: drop_off(funnel.contacted, funnel.responded),
                response_to_qualified: drop_off(funnel.responded, funnel.qualified),
                qualified_to_contracted: drop_off(funnel.qualified, funnel.contracted),
                contracted_to_closed: drop_off(funnel.contracted, funnel.closed),
            },
            computed_at: as_of,
        })
    }

    /// Snapshots for every class. A class that fails is logged and
    /// reported in the error map without affecting the others.
    pub fn snapshot_all(
        &self,
        period: Period,
        as_of: DateTime<Utc>,
    ) -> Result<(Vec<ClassMetricsSnapshot>, BTreeMap<PriorityClass, String>), EngineError> {
        let events = self.outcomes.query(period.since(as_of), as_of)?;
        let mut snapshots = Vec::with_capacity(PriorityClass::ALL.len());
        let mut failures = BTreeMap::new();
        for class in PriorityClass::ALL {
            match self.snapshot_from(class, period, as_of, &events) {
                Ok(s) => snapshots.push(s),
                Err(e) => {
                    tracing::warn!(%class, error = %e, "class metrics failed");
                    failures.insert(class, e.to_string());
                }
            }
        }
        Ok((snapshots, failures))
    }

    /// Opt-out and negative-response rates for a class over the trailing
    /// `window_days`.
    pub fn safety_signals(
        &self,
        class: PriorityClass,
        as_of: DateTime<Utc>,
        window_days: u32,
    ) -> Result<SafetySignals, EngineError> {
        let since = as_of - Duration::days(i64::from(window_days));
        let events = self.outcomes.query(Some(since), as_of)?;
        Ok(StageSets::collect(class, &events).safety())
    }
}

/// Sum volumes and revenue across classes.
pub fn top_line(snapshots: &[ClassMetricsSnapshot]) -> TopLine {
    let mut line = TopLine::default();
    for s in snapshots {
        line.total += s.funnel.total;
        line.contacted += s.funnel.contacted;
        line.closed += s.funnel.closed;
        line.expected_value_sum += s.revenue.expected_value_sum;
        line.realized_sum += s.revenue.realized_sum;
    }
    line.blended_conversion_rate = ratio(line.closed, line.contacted);
    line
}

/// Two-proportion z statistic for `(x2/n2) - (x1/n1)`.
#[allow(clippy::cast_precision_loss)]
fn two_proportion_z(x1: u64, n1: u64, x2: u64, n2: u64) -> Option<f64> {
    if n1 == 0 || n2 == 0 {
        return None;
    }
    let pooled = ratio(x1 + x2, n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    if se == 0.0 {
        return None;
    }
    Some((ratio(x2, n2) - ratio(x1, n1)) / se)
}

/// Rank classes by weighted score and describe notable patterns.
pub fn compare_classes(snapshots: &[ClassMetricsSnapshot], policies: &ClassPolicies) -> ClassComparison {
    let max_deal = snapshots
        .iter()
        .map(|s| s.revenue.average_deal_size)
        .max()
        .unwrap_or(Cents::ZERO);
    let mut ranking: Vec<ClassScore> = snapshots
        .iter()
        .map(|s| {
            let normalized_deal_size = if max_deal.is_positive() {
                s.revenue.average_deal_size.as_dollars_f64() / max_deal.as_dollars_f64()
            } else {
                0.0
            };
            let conversion = s.efficiency.overall_conversion;
            ClassScore {
                class: s.class,
                conversion,
                normalized_deal_size,
                score: CONVERSION_WEIGHT.mul_add(conversion, DEAL_SIZE_WEIGHT * normalized_deal_size),
            }
        })
        .collect();
    ranking.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.class.cmp(&b.class)));

    let mut insights = Vec::new();
    for higher in snapshots {
        for lower in snapshots.iter().filter(|s| higher.class.outranks(s.class)) {
            let (h, l) = (&higher.funnel, &lower.funnel);
            if h.contacted < MIN_COMPARISON_SAMPLE || l.contacted < MIN_COMPARISON_SAMPLE {
                continue;
            }
            if let Some(z) = two_proportion_z(h.closed, h.contacted, l.closed, l.contacted) {
                if z >= Z_CRITICAL {
                    insights.push(format!(
                        "{} converts at {:.1}% vs {} at {:.1}% (z = {z:.2}); review the tier thresholds",
                        lower.class,
                        lower.efficiency.overall_conversion * 100.0,
                        higher.class,
                        higher.efficiency.overall_conversion * 100.0,
                    ));
                }
            }
        }
    }
    for s in snapshots {
        let policy = policies.get(s.class);
        for (label, rate, ceiling) in [
            ("opt-out", s.safety.opt_out_rate, policy.opt_out_ceiling),
            ("negative-response", s.safety.negative_response_rate, policy.negative_response_ceiling),
        ] {
            if rate > ceiling {
                insights.push(format!(
                    "{} {label} rate {:.1}% has breached its {:.1}% ceiling",
                    s.class,
                    rate * 100.0,
                    ceiling * 100.0
                ));
            } else if rate >= ceiling * CEILING_WARNING_FRACTION && rate > 0.0 {
                insights.push(format!(
                    "{} {label} rate {:.1}% is approaching its {:.1}% ceiling",
                    s.class,
                    rate * 100.0,
                    ceiling * 100.0
                ));
            }
        }
    }
    ClassComparison { ranking, insights }
}
