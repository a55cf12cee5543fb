use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// A single predicate over a listing's facts. Conditions on a rule are
/// AND-combined; an empty list always matches.
///
/// The tag set is open on the wire: a condition written by a newer producer
/// decodes to `Unknown`, which never matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    CompetitorLower { threshold: Decimal },
    MarginBelow { threshold: Decimal },
    PriceUnchangedFor { days: i64 },
    StockVelocityBelow { units_per_week: Decimal },
    #[serde(other)]
    Unknown,
}

impl Condition {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Short human-readable form used in recommendation reasons and trails.
    pub fn describe(&self) -> String {
        match self {
            Self::CompetitorLower { threshold } => {
                format!("competitor at least {threshold}% lower")
            }
            Self::MarginBelow { threshold } => format!("margin below {threshold}%"),
            Self::PriceUnchangedFor { days } => format!("price unchanged for {days} days"),
            Self::StockVelocityBelow { units_per_week } => {
                format!("sales velocity below {units_per_week}/week")
            }
            Self::Unknown => "unrecognized condition".to_owned(),
        }
    }
}

/// A price mutation step. A rule's actions run in sequence, each consuming
/// the previous step's output as the running price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    AdjustPercent { value: Decimal },
    AdjustAmount { value: Decimal },
    SetPrice { value: Decimal },
    MatchCompetitor { offset_percent: Decimal },
    #[serde(other)]
    Unknown,
}

impl Action {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::AdjustPercent { value } => format!("adjust by {value}%"),
            Self::AdjustAmount { value } => format!("adjust by {value}"),
            Self::SetPrice { value } => format!("set price to {value}"),
            Self::MatchCompetitor { offset_percent } => {
                format!("match competitor with {offset_percent}% offset")
            }
            Self::Unknown => "unrecognized action".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: RuleId,
    pub name: String,
    pub rule_type: String,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Write model for creating a rule. Validation happens at this boundary so
/// stored rules always satisfy the catalog invariants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    pub rule_type: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update for an existing rule. `None` fields keep the stored value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub rule_type: Option<String>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<Action>>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

impl RuleDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_rule_shape(&self.name, &self.conditions, &self.actions)
    }
}

impl PricingRule {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_rule_shape(&self.name, &self.conditions, &self.actions)
    }

    pub fn apply_update(&mut self, update: RuleUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(rule_type) = update.rule_type {
            self.rule_type = rule_type;
        }
        if let Some(conditions) = update.conditions {
            self.conditions = conditions;
        }
        if let Some(actions) = update.actions {
            self.actions = actions;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
    }
}

fn validate_rule_shape(
    name: &str,
    conditions: &[Condition],
    actions: &[Action],
) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::InvariantViolation("rule name must not be blank".to_owned()));
    }
    if actions.is_empty() {
        return Err(DomainError::InvariantViolation(
            "rule must define at least one action".to_owned(),
        ));
    }
    if conditions.iter().any(Condition::is_unknown) {
        return Err(DomainError::InvariantViolation(
            "rule contains an unrecognized condition type".to_owned(),
        ));
    }
    if actions.iter().any(Action::is_unknown) {
        return Err(DomainError::InvariantViolation(
            "rule contains an unrecognized action type".to_owned(),
        ));
    }
    Ok(())
}
