//! Shared domain types: priority classes, entities and outcome events.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::classifier::ClassificationResult;
use crate::core::intent::ReplyIntent;
use crate::util::money::Cents;

/// Entity identifier.
pub type EntityId = u64;

/// Priority tier. The declaration order *is* the priority order: `A` is
/// worked before `B`, which is worked before `C`. `Ord` follows it, so a
/// smaller value means a higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriorityClass {
    /// Dual-path opportunity.
    A,
    /// Single-path, high-value opportunity.
    B,
    /// Viable default tier.
    C,
}

impl PriorityClass {
    /// All classes, highest priority first.
    pub const ALL: [Self; 3] = [Self::A, Self::B, Self::C];

    /// The top class.
    pub const TOP: Self = Self::A;

    /// The lowest class.
    pub const LOWEST: Self = Self::C;

    /// Zero-based priority rank (0 = highest).
    pub const fn rank(self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
        }
    }

    /// Human-readable class name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "Class A",
            Self::B => "Class B",
            Self::C => "Class C",
        }
    }

    /// Whether this class outranks `other`.
    pub fn outranks(self, other: Self) -> bool {
        self < other
    }

    /// Classes strictly above this one, highest first.
    pub fn higher(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |c| c.outranks(self))
    }

    /// The next class down, if any.
    pub fn next_lower(self) -> Option<Self> {
        Self::ALL.into_iter().find(|c| self.outranks(*c))
    }

    /// Whether this is the top class.
    pub fn is_top(self) -> bool {
        self == Self::TOP
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Economic attributes supplied by the pricing model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicAttributes {
    /// Primary-path recoverable amount.
    pub primary_amount: Cents,
    /// Secondary-path value (equity).
    pub secondary_value: Cents,
    /// Deadline after which the primary path is lost.
    pub urgency_deadline: Option<NaiveDate>,
    /// A phone number is on file.
    pub has_phone: bool,
    /// An email address is on file.
    pub has_email: bool,
    /// The entity appears on both source lists.
    pub cross_referenced: bool,
}

impl EconomicAttributes {
    /// Whether at least one contact channel exists.
    pub const fn is_contactable(&self) -> bool {
        self.has_phone || self.has_email
    }
}

/// Engagement lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Not yet contacted.
    #[default]
    New,
    /// At least one attempt made.
    Contacted,
    /// Replied to outreach.
    Responded,
    /// Qualified after a conversation.
    Qualified,
    /// Agreement signed.
    Contracted,
    /// Deal closed.
    Closed,
    /// Asked not to be contacted again.
    OptedOut,
}

impl EntityStatus {
    /// Whether outreach may still target this entity.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::New | Self::Contacted)
    }
}

/// Mutable engagement fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    /// Number of recorded contact attempts.
    pub contact_attempts: u32,
    /// Time of the most recent attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: EntityStatus,
}

/// Current classification held by an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Full classifier output.
    pub result: ClassificationResult,
    /// 1-based rank within the class, once ranked.
    pub rank: Option<u32>,
    /// When the classification was written.
    pub classified_at: DateTime<Utc>,
}

/// An economic opportunity being classified and scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Immutable identity.
    pub id: EntityId,
    /// Inputs to the classifier.
    pub attributes: EconomicAttributes,
    /// Exactly one current classification, or none.
    pub assignment: Option<Assignment>,
    /// When the classifier last evaluated this entity, viable or not.
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Engagement state.
    pub engagement: Engagement,
}

impl Entity {
    /// New, unclassified entity.
    pub fn new(id: EntityId, attributes: EconomicAttributes) -> Self {
        Self {
            id,
            attributes,
            assignment: None,
            evaluated_at: None,
            engagement: Engagement::default(),
        }
    }

    /// Current class, if classified.
    pub fn class(&self) -> Option<PriorityClass> {
        self.assignment.as_ref().map(|a| a.result.class)
    }

    /// Current expected value, zero if unclassified.
    pub fn expected_value(&self) -> Cents {
        self.assignment
            .as_ref()
            .map_or(Cents::ZERO, |a| a.result.expected_value.total)
    }
}

/// One contact attempt; the sole input to cooldown and max-attempt checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAttempt {
    /// Idempotency key for the logical attempt.
    pub attempt_id: Uuid,
    /// Entity contacted.
    pub entity_id: EntityId,
    /// Class at the time of the attempt.
    pub class: PriorityClass,
    /// When the attempt happened.
    pub at: DateTime<Utc>,
}

impl ContactAttempt {
    /// New attempt with a fresh idempotency key.
    pub fn new(entity_id: EntityId, class: PriorityClass, at: DateTime<Utc>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            entity_id,
            class,
            at,
        }
    }
}

/// Kind of funnel outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Outreach attempt made.
    Contacted,
    /// Entity replied.
    Responded {
        /// Classified reply intent.
        intent: ReplyIntent,
    },
    /// Qualified after conversation.
    Qualified,
    /// Agreement signed.
    Contracted,
    /// Deal closed with realized revenue.
    Closed {
        /// Revenue realized.
        realized: Cents,
    },
    /// Entity opted out.
    OptedOut,
}

/// Historical outcome event consumed by class metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    /// Entity the event concerns.
    pub entity_id: EntityId,
    /// Class of the entity when the event happened.
    pub class: PriorityClass,
    /// What happened.
    pub kind: OutcomeKind,
    /// When it happened.
    pub at: DateTime<Utc>,
}
