use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::listing::Facts;

/// Guard bounds for candidate prices. Defaults match the shipped
/// configuration; callers may override per evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyBounds {
    pub min_margin_percent: Decimal,
    pub max_step_percent: Decimal,
}

impl Default for SafetyBounds {
    fn default() -> Self {
        Self { min_margin_percent: Decimal::new(10, 0), max_step_percent: Decimal::new(20, 0) }
    }
}

/// Per-call override of the configured bounds. `None` fields keep the
/// configured value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyOverrides {
    pub min_margin_percent: Option<Decimal>,
    pub max_step_percent: Option<Decimal>,
}

impl SafetyBounds {
    pub fn with_overrides(&self, overrides: &SafetyOverrides) -> Self {
        Self {
            min_margin_percent: overrides.min_margin_percent.unwrap_or(self.min_margin_percent),
            max_step_percent: overrides.max_step_percent.unwrap_or(self.max_step_percent),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyViolation {
    InvalidPrice { candidate: Decimal },
    MarginTooLow { margin_percent: Decimal, min_margin_percent: Decimal },
    StepTooLarge { step_percent: Decimal, max_step_percent: Decimal },
}

impl SafetyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPrice { .. } => "INVALID_PRICE",
            Self::MarginTooLow { .. } => "MARGIN_TOO_LOW",
            Self::StepTooLarge { .. } => "STEP_TOO_LARGE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub ok: bool,
    pub violations: Vec<SafetyViolation>,
}

impl SafetyVerdict {
    pub fn pass() -> Self {
        Self { ok: true, violations: Vec::new() }
    }
}

/// Validates a candidate price against the bounds. Every check runs; the
/// verdict carries all violations, not just the first.
pub fn check(candidate: Decimal, facts: &Facts, bounds: &SafetyBounds) -> SafetyVerdict {
    let mut violations = Vec::new();

    if candidate <= Decimal::ZERO {
        violations.push(SafetyViolation::InvalidPrice { candidate });
    }

    if candidate > Decimal::ZERO {
        let margin_percent = (candidate - facts.cost_price) / candidate * Decimal::ONE_HUNDRED;
        if margin_percent < bounds.min_margin_percent {
            violations.push(SafetyViolation::MarginTooLow {
                margin_percent: margin_percent.round_dp(2),
                min_margin_percent: bounds.min_margin_percent,
            });
        }
    }

    if facts.current_price > Decimal::ZERO {
        let step_percent =
            ((candidate - facts.current_price) / facts.current_price * Decimal::ONE_HUNDRED).abs();
        if step_percent > bounds.max_step_percent {
            violations.push(SafetyViolation::StepTooLarge {
                step_percent: step_percent.round_dp(2),
                max_step_percent: bounds.max_step_percent,
            });
        }
    }

    SafetyVerdict { ok: violations.is_empty(), violations }
}
