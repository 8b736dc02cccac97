//! Deterministic priority-class classifier.
//!
//! Classification is a pure function of an entity's economic attributes and
//! the `as_of` day used for deadline arithmetic. It holds no state and can be
//! run concurrently across any number of entities.
//!
//! Branches are tried in a fixed order and the first qualifying one wins:
//!
//! 1. primary amount below the viability floor: not viable
//! 2. both paths qualify (primary ≥ T1 and secondary ≥ T2): `A`
//! 3. cross-referenced and primary ≥ T1: `A`
//! 4. primary ≥ T3: `B`
//! 5. otherwise: `C`

use std::cmp::Reverse;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::types::{EconomicAttributes, Entity, EntityId, PriorityClass};
use crate::util::money::{Cents, BPS_SCALE};

/// Extra weight given to deadline-driven entities when ranking within a class.
const DEADLINE_PRESSURE_BONUS_BPS: u32 = 2_000;

/// Directional impact of a contributing factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    /// Pushes toward a higher class or confidence.
    Positive,
    /// Informational.
    Neutral,
    /// Pushes toward a lower class or confidence.
    Negative,
}

/// Confidence tier of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Weak evidence.
    Low,
    /// Moderate evidence.
    Medium,
    /// Strong evidence.
    High,
}

impl Confidence {
    const fn downgrade(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

/// One explanatory factor in a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    /// Factor name.
    pub name: String,
    /// Observed value, formatted.
    pub value: String,
    /// Direction of influence.
    pub impact: Impact,
    /// What the factor contributed.
    pub contribution: String,
}

impl Factor {
    fn new(name: &str, value: impl Into<String>, impact: Impact, contribution: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            impact,
            contribution: contribution.into(),
        }
    }
}

/// Expected value broken down per revenue path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedValue {
    /// Fee on the primary path.
    pub primary_fee: Cents,
    /// Fee on the secondary path (zero when the path is not counted).
    pub secondary_fee: Cents,
    /// Sum of counted path fees.
    pub total: Cents,
}

/// Output of a single classification call. Built whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Assigned class.
    pub class: PriorityClass,
    /// Display name of the class.
    pub class_name: String,
    /// Human-readable explanation of the winning branch.
    pub reason: String,
    /// Expected value per path.
    pub expected_value: ExpectedValue,
    /// Estimated days until cash is realized.
    pub days_to_cash: u32,
    /// Whether an urgency deadline shortened the estimate.
    pub deadline_pressure: bool,
    /// Confidence tier.
    pub confidence: Confidence,
    /// Contributing factors in evaluation order.
    pub factors: Vec<Factor>,
}

impl ClassificationResult {
    /// Expected value weighted for deadline pressure, used for ranking.
    pub fn weighted_value(&self) -> Cents {
        let bonus = if self.deadline_pressure { DEADLINE_PRESSURE_BONUS_BPS } else { 0 };
        self.expected_value.total.apply_bps(BPS_SCALE + bonus)
    }
}

/// Within-class ordering key: weighted value desc, days-to-cash asc, id asc.
pub fn rank_key(entity: &Entity) -> (Reverse<Cents>, u32, EntityId) {
    entity.assignment.as_ref().map_or(
        (Reverse(Cents::ZERO), u32::MAX, entity.id),
        |a| (Reverse(a.result.weighted_value()), a.result.days_to_cash, entity.id),
    )
}

/// Thresholds and fee schedule used by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRules {
    /// Minimum primary amount for any class.
    pub viability_floor: Cents,
    /// T1: primary amount required for the dual-path class.
    pub dual_primary_min: Cents,
    /// T2: secondary value required for the dual-path class.
    pub dual_secondary_min: Cents,
    /// T3: primary amount required for the single-path high-value class.
    pub single_path_min: Cents,
    /// Fee on the primary path, basis points.
    pub primary_fee_bps: u32,
    /// Fee on the secondary path, basis points.
    pub secondary_fee_bps: u32,
    /// Base days-to-cash estimate for `A`, `B`, `C`.
    pub base_days_to_cash: [u32; 3],
    /// Lower bound on any days-to-cash estimate.
    pub min_days_to_cash: u32,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            viability_floor: Cents::from_dollars(5_000),
            dual_primary_min: Cents::from_dollars(15_000),
            dual_secondary_min: Cents::from_dollars(10_000),
            single_path_min: Cents::from_dollars(75_000),
            primary_fee_bps: 2_500,
            secondary_fee_bps: 1_000,
            base_days_to_cash: [45, 60, 90],
            min_days_to_cash: 7,
        }
    }
}

/// Which branch qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    DualPath,
    CrossReference,
    SinglePath,
    Default,
}

impl Branch {
    const fn class(self) -> PriorityClass {
        match self {
            Self::DualPath | Self::CrossReference => PriorityClass::A,
            Self::SinglePath => PriorityClass::B,
            Self::Default => PriorityClass::C,
        }
    }
}

type Predicate = fn(&ClassifierRules, &EconomicAttributes) -> bool;

fn dual_path(r: &ClassifierRules, a: &EconomicAttributes) -> bool {
    a.primary_amount >= r.dual_primary_min && a.secondary_value >= r.dual_secondary_min
}

fn cross_reference(r: &ClassifierRules, a: &EconomicAttributes) -> bool {
    a.cross_referenced && a.primary_amount >= r.dual_primary_min
}

fn single_path(r: &ClassifierRules, a: &EconomicAttributes) -> bool {
    a.primary_amount >= r.single_path_min
}

fn viable(_: &ClassifierRules, _: &EconomicAttributes) -> bool {
    true
}

/// Precedence list. The last entry matches anything that passed the floor.
const BRANCHES: [(Predicate, Branch); 4] = [
    (dual_path, Branch::DualPath),
    (cross_reference, Branch::CrossReference),
    (single_path, Branch::SinglePath),
    (viable, Branch::Default),
];

/// Pure classifier over [`ClassifierRules`].
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: ClassifierRules,
}

impl Classifier {
    /// Classifier over explicit rules.
    pub const fn new(rules: ClassifierRules) -> Self {
        Self { rules }
    }

    /// Classifier using the thresholds in an engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.classifier_rules())
    }

    /// Rules in effect.
    pub const fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    /// Reject malformed attributes.
    pub fn validate(&self, entity: &Entity) -> Result<(), EngineError> {
        let attrs = &entity.attributes;
        if attrs.primary_amount.as_i64() < 0 {
            return Err(EngineError::Validation {
                entity_id: entity.id,
                reason: format!("negative primary amount {}", attrs.primary_amount),
            });
        }
        if attrs.secondary_value.as_i64() < 0 {
            return Err(EngineError::Validation {
                entity_id: entity.id,
                reason: format!("negative secondary value {}", attrs.secondary_value),
            });
        }
        Ok(())
    }

    /// Validate then classify an entity.
    pub fn classify_entity(
        &self,
        entity: &Entity,
        as_of: NaiveDate,
    ) -> Result<Option<ClassificationResult>, EngineError> {
        self.validate(entity)?;
        Ok(self.classify(&entity.attributes, as_of))
    }

    /// Classify attributes. `None` means not viable.
    pub fn classify(&self, attrs: &EconomicAttributes, as_of: NaiveDate) -> Option<ClassificationResult> {
        let rules = &self.rules;
        if attrs.primary_amount < rules.viability_floor {
            return None;
        }

        let branch = BRANCHES
            .iter()
            .find(|(qualifies, _)| qualifies(rules, attrs))
            .map_or(Branch::Default, |(_, branch)| *branch);
        let class = branch.class();

        let mut factors = Vec::with_capacity(5);
        let primary_fee = attrs.primary_amount.apply_bps(rules.primary_fee_bps);
        let counts_secondary = matches!(branch, Branch::DualPath | Branch::CrossReference);
        let secondary_fee = if counts_secondary {
            attrs.secondary_value.apply_bps(rules.secondary_fee_bps)
        } else {
            Cents::ZERO
        };

        factors.push(Factor::new(
            "primary_amount",
            attrs.primary_amount.to_string(),
            if attrs.primary_amount >= rules.dual_primary_min { Impact::Positive } else { Impact::Neutral },
            format!("fee {primary_fee} at {}", format_bps(rules.primary_fee_bps)),
        ));
        factors.push(Factor::new(
            "secondary_value",
            attrs.secondary_value.to_string(),
            if counts_secondary && attrs.secondary_value >= rules.dual_secondary_min {
                Impact::Positive
            } else {
                Impact::Neutral
            },
            if counts_secondary {
                format!("fee {secondary_fee} at {}", format_bps(rules.secondary_fee_bps))
            } else {
                "not counted".to_string()
            },
        ));

        let (reason, mut confidence) = match branch {
            Branch::DualPath => (
                format!(
                    "both revenue paths qualify: primary {} >= {} and secondary {} >= {}",
                    attrs.primary_amount, rules.dual_primary_min, attrs.secondary_value, rules.dual_secondary_min
                ),
                Confidence::High,
            ),
            Branch::CrossReference => {
                factors.push(Factor::new(
                    "cross_reference",
                    "true",
                    Impact::Positive,
                    "auto-qualifies for the dual-path class",
                ));
                (
                    format!(
                        "cross-referenced entity auto-qualifies: primary {} >= {}",
                        attrs.primary_amount, rules.dual_primary_min
                    ),
                    Confidence::Medium,
                )
            }
            Branch::SinglePath => (
                format!(
                    "single high-value path: primary {} >= {}",
                    attrs.primary_amount, rules.single_path_min
                ),
                Confidence::Medium,
            ),
            Branch::Default => (
                format!(
                    "viable single path: primary {} >= floor {}",
                    attrs.primary_amount, rules.viability_floor
                ),
                Confidence::Low,
            ),
        };

        let base_days = rules.base_days_to_cash[usize::from(class.rank())];
        let (days_to_cash, deadline_pressure) = match attrs.urgency_deadline {
            Some(deadline) => {
                let days_left = (deadline - as_of).num_days();
                if days_left < 0 {
                    factors.push(Factor::new(
                        "urgency_deadline",
                        deadline.to_string(),
                        Impact::Negative,
                        format!("deadline passed {} days ago", -days_left),
                    ));
                    confidence = Confidence::Low;
                    (rules.min_days_to_cash, true)
                } else if days_left < i64::from(base_days) {
                    let days = u32::try_from(days_left).unwrap_or(base_days).max(rules.min_days_to_cash);
                    factors.push(Factor::new(
                        "urgency_deadline",
                        deadline.to_string(),
                        Impact::Positive,
                        format!("{days_left} days left shortens estimate to {days} days"),
                    ));
                    (days, true)
                } else {
                    factors.push(Factor::new(
                        "urgency_deadline",
                        deadline.to_string(),
                        Impact::Neutral,
                        format!("{days_left} days left, base estimate {base_days} days"),
                    ));
                    (base_days, false)
                }
            }
            None => (base_days, false),
        };

        if attrs.is_contactable() {
            factors.push(Factor::new(
                "contactability",
                channels(attrs),
                Impact::Positive,
                "reachable",
            ));
        } else {
            confidence = confidence.downgrade();
            factors.push(Factor::new(
                "contactability",
                "none",
                Impact::Negative,
                "no contact channel on file",
            ));
        }

        Some(ClassificationResult {
            class,
            class_name: class.name().to_string(),
            reason,
            expected_value: ExpectedValue {
                primary_fee,
                secondary_fee,
                total: primary_fee + secondary_fee,
            },
            days_to_cash,
            deadline_pressure,
            confidence,
            factors,
        })
    }
}

fn format_bps(bps: u32) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

fn channels(attrs: &EconomicAttributes) -> String {
    match (attrs.has_phone, attrs.has_email) {
        (true, true) => "phone+email".to_string(),
        (true, false) => "phone".to_string(),
        _ => "email".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(primary: i64, secondary: i64) -> EconomicAttributes {
        EconomicAttributes {
            primary_amount: Cents::from_dollars(primary),
            secondary_value: Cents::from_dollars(secondary),
            urgency_deadline: None,
            has_phone: true,
            has_email: false,
            cross_referenced: false,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn dual_path_scenario() {
        let result = Classifier::default().classify(&attrs(20_000, 15_000), day()).unwrap();
        assert_eq!(result.class, PriorityClass::A);
        assert_eq!(result.expected_value.total, Cents::from_dollars(6_500));
        assert_eq!(result.expected_value.primary_fee, Cents::from_dollars(5_000));
        assert_eq!(result.expected_value.secondary_fee, Cents::from_dollars(1_500));
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn single_path_scenario() {
        let result = Classifier::default().classify(&attrs(80_000, 0), day()).unwrap();
        assert_eq!(result.class, PriorityClass::B);
        assert_eq!(result.expected_value.total, Cents::from_dollars(20_000));
        assert_eq!(result.expected_value.secondary_fee, Cents::ZERO);
    }

    #[test]
    fn below_floor_is_not_viable() {
        assert!(Classifier::default().classify(&attrs(3_000, 50_000), day()).is_none());
    }

    #[test]
    fn floor_itself_is_viable_default() {
        let result = Classifier::default().classify(&attrs(5_000, 0), day()).unwrap();
        assert_eq!(result.class, PriorityClass::C);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn cross_reference_auto_qualifies() {
        let mut a = attrs(15_000, 2_000);
        a.cross_referenced = true;
        let result = Classifier::default().classify(&a, day()).unwrap();
        assert_eq!(result.class, PriorityClass::A);
        assert_eq!(result.expected_value.total, Cents::from_dollars(3_750 + 200));
        assert!(result.factors.iter().any(|f| f.name == "cross_reference"));
    }

    #[test]
    fn cross_reference_below_t1_falls_through() {
        let mut a = attrs(14_999, 20_000);
        a.cross_referenced = true;
        let result = Classifier::default().classify(&a, day()).unwrap();
        assert_eq!(result.class, PriorityClass::C);
    }

    #[test]
    fn dual_path_wins_over_single_path() {
        let result = Classifier::default().classify(&attrs(90_000, 10_000), day()).unwrap();
        assert_eq!(result.class, PriorityClass::A);
    }

    #[test]
    fn deadline_shortens_but_never_below_floor() {
        let mut a = attrs(20_000, 0);
        a.urgency_deadline = Some(day() + chrono::Duration::days(20));
        let result = Classifier::default().classify(&a, day()).unwrap();
        assert_eq!(result.days_to_cash, 20);
        assert!(result.deadline_pressure);

        a.urgency_deadline = Some(day() + chrono::Duration::days(2));
        let result = Classifier::default().classify(&a, day()).unwrap();
        assert_eq!(result.days_to_cash, 7);

        a.urgency_deadline = Some(day() - chrono::Duration::days(3));
        let result = Classifier::default().classify(&a, day()).unwrap();
        assert_eq!(result.days_to_cash, 7);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn distant_deadline_keeps_base_estimate() {
        let mut a = attrs(20_000, 0);
        a.urgency_deadline = Some(day() + chrono::Duration::days(400));
        let result = Classifier::default().classify(&a, day()).unwrap();
        assert_eq!(result.days_to_cash, 90);
        assert!(!result.deadline_pressure);
    }

    #[test]
    fn uncontactable_downgrades_confidence() {
        let mut a = attrs(20_000, 15_000);
        a.has_phone = false;
        let result = Classifier::default().classify(&a, day()).unwrap();
        assert_eq!(result.confidence, Confidence::Medium);
        let last = result.factors.last().unwrap();
        assert_eq!(last.name, "contactability");
        assert_eq!(last.impact, Impact::Negative);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = Classifier::default();
        let mut a = attrs(42_000, 11_000);
        a.urgency_deadline = Some(day() + chrono::Duration::days(12));
        assert_eq!(c.classify(&a, day()), c.classify(&a, day()));
    }

    #[test]
    fn negative_amount_fails_validation() {
        let entity = Entity::new(9, attrs(-1, 0));
        let err = Classifier::default().classify_entity(&entity, day()).unwrap_err();
        assert!(matches!(err, EngineError::Validation { entity_id: 9, .. }));
    }
}
