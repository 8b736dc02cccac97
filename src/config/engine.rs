//! Engine configuration structures.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::classifier::ClassifierRules;
use crate::core::error::AppResult;
use crate::core::types::PriorityClass;
use crate::util::money::{Cents, BPS_SCALE};

/// Operator authorization level. Higher levels permit more autonomous work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationLevel {
    /// Nothing may be scheduled.
    Manual,
    /// Top-tier work only, under supervision.
    Supervised,
    /// Supervised plus mid-tier work.
    Elevated,
    /// Every tier.
    Full,
}

impl std::str::FromStr for AuthorizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "supervised" => Ok(Self::Supervised),
            "elevated" => Ok(Self::Elevated),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown authorization level `{other}`")),
        }
    }
}

/// Local operating hours, `[start_hour, end_hour)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    /// First local hour in which work is allowed.
    pub start_hour: u32,
    /// Local hour at which work stops.
    pub end_hour: u32,
    /// Offset of the operating timezone from UTC, minutes.
    pub utc_offset_minutes: i32,
}

impl OperatingHours {
    /// Whether a fractional local hour is inside the window.
    pub fn contains(&self, local_hour: f64) -> bool {
        local_hour >= f64::from(self.start_hour) && local_hour < f64::from(self.end_hour)
    }

    /// Length of the window in hours.
    pub fn span_hours(&self) -> f64 {
        f64::from(self.end_hour.saturating_sub(self.start_hour))
    }
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 20,
            utc_offset_minutes: 0,
        }
    }
}

/// Per-class scheduling and safety policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicy {
    /// Minimum primary amount for the class (cents).
    pub min_value: Cents,
    /// Attempt ceiling per entity.
    pub max_attempts: u32,
    /// Minimum hours between attempts on one entity.
    pub cooldown_hours: u32,
    /// Share of remaining daily capacity this class may take, percent.
    pub daily_cap_percent: u32,
    /// Rolling opt-out rate ceiling, as a fraction.
    pub opt_out_ceiling: f64,
    /// Rolling negative-response rate ceiling, as a fraction.
    pub negative_response_ceiling: f64,
    /// Minimum authorization level required to work the class.
    pub min_authorization: AuthorizationLevel,
}

impl ClassPolicy {
    /// Cooldown as a chrono duration.
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cooldown_hours))
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.daily_cap_percent == 0 || self.daily_cap_percent > 100 {
            return Err("daily_cap_percent must be in 1..=100".into());
        }
        for (name, ceiling) in [
            ("opt_out_ceiling", self.opt_out_ceiling),
            ("negative_response_ceiling", self.negative_response_ceiling),
        ] {
            if !(ceiling > 0.0 && ceiling <= 1.0) {
                return Err(format!("{name} must be in (0, 1]"));
            }
        }
        Ok(())
    }
}

/// One policy per class; every class is always configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicies {
    /// Policy for class `A`.
    #[serde(rename = "A")]
    pub a: ClassPolicy,
    /// Policy for class `B`.
    #[serde(rename = "B")]
    pub b: ClassPolicy,
    /// Policy for class `C`.
    #[serde(rename = "C")]
    pub c: ClassPolicy,
}

impl ClassPolicies {
    /// Policy for a class.
    pub const fn get(&self, class: PriorityClass) -> &ClassPolicy {
        match class {
            PriorityClass::A => &self.a,
            PriorityClass::B => &self.b,
            PriorityClass::C => &self.c,
        }
    }

    /// Mutable policy for a class.
    pub fn get_mut(&mut self, class: PriorityClass) -> &mut ClassPolicy {
        match class {
            PriorityClass::A => &mut self.a,
            PriorityClass::B => &mut self.b,
            PriorityClass::C => &mut self.c,
        }
    }
}

impl Default for ClassPolicies {
    fn default() -> Self {
        Self {
            a: ClassPolicy {
                min_value: Cents::from_dollars(15_000),
                max_attempts: 6,
                cooldown_hours: 24,
                daily_cap_percent: 100,
                opt_out_ceiling: 0.10,
                negative_response_ceiling: 0.20,
                min_authorization: AuthorizationLevel::Supervised,
            },
            b: ClassPolicy {
                min_value: Cents::from_dollars(75_000),
                max_attempts: 4,
                cooldown_hours: 48,
                daily_cap_percent: 100,
                opt_out_ceiling: 0.08,
                negative_response_ceiling: 0.15,
                min_authorization: AuthorizationLevel::Elevated,
            },
            c: ClassPolicy {
                min_value: Cents::from_dollars(5_000),
                max_attempts: 3,
                cooldown_hours: 72,
                daily_cap_percent: 50,
                opt_out_ceiling: 0.05,
                negative_response_ceiling: 0.10,
                min_authorization: AuthorizationLevel::Full,
            },
        }
    }
}

/// Classifier settings that are not per-class thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// T2: secondary value required for the dual-path class (cents).
    pub secondary_min: Cents,
    /// Primary-path fee, basis points.
    pub primary_fee_bps: u32,
    /// Secondary-path fee, basis points.
    pub secondary_fee_bps: u32,
    /// Base days-to-cash for `A`, `B`, `C`.
    pub base_days_to_cash: [u32; 3],
    /// Floor for any days-to-cash estimate.
    pub min_days_to_cash: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        let rules = ClassifierRules::default();
        Self {
            secondary_min: rules.dual_secondary_min,
            primary_fee_bps: rules.primary_fee_bps,
            secondary_fee_bps: rules.secondary_fee_bps,
            base_days_to_cash: rules.base_days_to_cash,
            min_days_to_cash: rules.min_days_to_cash,
        }
    }
}

/// Backfill job limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Entities classified per batch.
    pub batch_size: usize,
    /// Safety cap on entities processed per run.
    pub max_entities: usize,
    /// Worker threads; 0 means one per CPU.
    pub workers: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_entities: 10_000,
            workers: 0,
        }
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global kill switch.
    pub engine_enabled: bool,
    /// Attempts allowed per calendar day.
    pub daily_capacity_target: u32,
    /// Utilization the day should reach, percent.
    pub utilization_target_pct: f64,
    /// Current operator authorization level.
    ///
    /// Defaults to [`AuthorizationLevel::Supervised`], which admits only the
    /// top class: once class A is exhausted the engine issues nothing until
    /// an operator raises the level to `Elevated` (class B) or `Full`
    /// (class C). Raising it is an explicit operator decision.
    pub authorization_level: AuthorizationLevel,
    /// Operating window.
    pub operating_hours: OperatingHours,
    /// Trailing window for stop-loss rates, days.
    pub stop_loss_window_days: u32,
    /// Contacted entities needed in the window before stop-loss rates apply.
    pub stop_loss_min_sample: u64,
    /// Issued-but-unreported tickets are released after this long.
    pub reservation_timeout_minutes: u32,
    /// Period of the reconciliation cycle, seconds.
    pub cycle_interval_secs: u64,
    /// Classifier settings.
    pub classifier: ClassifierSettings,
    /// Policy per class.
    pub classes: ClassPolicies,
    /// Backfill limits.
    pub backfill: BackfillConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_enabled: true,
            daily_capacity_target: 50,
            utilization_target_pct: 90.0,
            authorization_level: AuthorizationLevel::Supervised,
            operating_hours: OperatingHours::default(),
            stop_loss_window_days: 7,
            stop_loss_min_sample: 20,
            reservation_timeout_minutes: 60,
            cycle_interval_secs: 900,
            classifier: ClassifierSettings::default(),
            classes: ClassPolicies::default(),
            backfill: BackfillConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Policy for a class.
    pub const fn policy(&self, class: PriorityClass) -> &ClassPolicy {
        self.classes.get(class)
    }

    /// Classifier rules derived from per-class minimum values and settings.
    pub fn classifier_rules(&self) -> ClassifierRules {
        ClassifierRules {
            viability_floor: self.policy(PriorityClass::C).min_value,
            dual_primary_min: self.policy(PriorityClass::A).min_value,
            dual_secondary_min: self.classifier.secondary_min,
            single_path_min: self.policy(PriorityClass::B).min_value,
            primary_fee_bps: self.classifier.primary_fee_bps,
            secondary_fee_bps: self.classifier.secondary_fee_bps,
            base_days_to_cash: self.classifier.base_days_to_cash,
            min_days_to_cash: self.classifier.min_days_to_cash,
        }
    }

    /// Validate all values.
    pub fn validate(&self) -> Result<(), String> {
        if self.daily_capacity_target == 0 {
            return Err("daily_capacity_target must be greater than 0".into());
        }
        if !(self.utilization_target_pct > 0.0 && self.utilization_target_pct <= 100.0) {
            return Err("utilization_target_pct must be in (0, 100]".into());
        }
        let hours = &self.operating_hours;
        if hours.start_hour >= hours.end_hour || hours.end_hour > 24 {
            return Err("operating_hours must satisfy start_hour < end_hour <= 24".into());
        }
        if hours.utc_offset_minutes.abs() > 14 * 60 {
            return Err("operating_hours.utc_offset_minutes must be within +/-14h".into());
        }
        if self.stop_loss_window_days == 0 {
            return Err("stop_loss_window_days must be greater than 0".into());
        }
        if self.reservation_timeout_minutes == 0 {
            return Err("reservation_timeout_minutes must be greater than 0".into());
        }
        if self.cycle_interval_secs == 0 {
            return Err("cycle_interval_secs must be greater than 0".into());
        }
        for class in PriorityClass::ALL {
            let policy = self.policy(class);
            policy
                .validate()
                .map_err(|e| format!("{class} policy invalid: {e}"))?;
            if let Some(lower) = class.next_lower() {
                if self.policy(lower).min_authorization < policy.min_authorization {
                    return Err(format!(
                        "{lower} must not require a weaker authorization than {class}"
                    ));
                }
            }
        }
        let rules = self.classifier_rules();
        if !(rules.viability_floor < rules.dual_primary_min && rules.dual_primary_min < rules.single_path_min) {
            return Err("min_value must increase: C < A < B (floor < T1 < T3)".into());
        }
        if self.classifier.primary_fee_bps > BPS_SCALE || self.classifier.secondary_fee_bps > BPS_SCALE {
            return Err("fee basis points must not exceed 10000".into());
        }
        if self.backfill.batch_size == 0 || self.backfill.max_entities == 0 {
            return Err("backfill batch_size and max_entities must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment, reading `.env` if present.
    ///
    /// `TIER_CONFIG_JSON` names a JSON file used as the base; the
    /// `TIER_DAILY_CAPACITY`, `TIER_AUTHORIZATION_LEVEL` and
    /// `TIER_ENGINE_ENABLED` variables override individual fields.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var("TIER_CONFIG_JSON") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };
        if let Ok(raw) = std::env::var("TIER_DAILY_CAPACITY") {
            cfg.daily_capacity_target = raw
                .parse()
                .with_context(|| format!("TIER_DAILY_CAPACITY=`{raw}` is not a number"))?;
        }
        if let Ok(raw) = std::env::var("TIER_AUTHORIZATION_LEVEL") {
            cfg.authorization_level = raw.parse().map_err(anyhow::Error::msg)?;
        }
        if let Ok(raw) = std::env::var("TIER_ENGINE_ENABLED") {
            cfg.engine_enabled = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}
