pub mod actions;
pub mod conditions;
pub mod safety;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::listing::{Facts, ListingId};
use crate::domain::recommendation::change_percent;
use crate::domain::rule::{Action, PricingRule, RuleId};

pub use safety::{SafetyBounds, SafetyOverrides, SafetyVerdict, SafetyViolation};

/// One applied action step on the winning rule's trail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub conditions_matched: Vec<String>,
    pub action_applied: String,
    pub resulting_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Rough demand-side estimate attached to proposals that change the price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactEstimate {
    pub price_change_percent: Decimal,
    pub estimated_sales_change_percent: Decimal,
    pub risk_level: RiskLevel,
}

/// Outcome of evaluating the rule set against one facts snapshot. Ephemeral:
/// the workflow persists a Recommendation from it, nothing stores a Proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub listing_id: ListingId,
    pub current_price: Decimal,
    pub proposed_price: Decimal,
    pub trail: Vec<TrailEntry>,
    pub safety: SafetyVerdict,
    pub warnings: Vec<String>,
    pub confidence: Decimal,
    pub impact: Option<ImpactEstimate>,
    pub evaluated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn is_blocked(&self) -> bool {
        !self.safety.ok
    }

    pub fn changed(&self) -> bool {
        self.proposed_price != self.current_price
    }

    pub fn is_noop(&self) -> bool {
        self.trail.is_empty() && self.safety.ok
    }

    pub fn change_percent(&self) -> Decimal {
        change_percent(self.current_price, self.proposed_price)
    }

    /// Operator-facing summary of why this price was proposed. Becomes the
    /// `reason` of a persisted recommendation.
    pub fn reason(&self) -> String {
        let Some(first) = self.trail.first() else {
            return "no active rule matched".to_owned();
        };
        let conditions = if first.conditions_matched.is_empty() {
            "always matches".to_owned()
        } else {
            first.conditions_matched.join(", ")
        };
        let steps: Vec<String> =
            self.trail.iter().map(|entry| entry.action_applied.clone()).collect();
        format!("rule `{}` matched ({}); {}", first.rule_name, conditions, steps.join(", then "))
    }

    fn noop(facts: &Facts, warnings: Vec<String>) -> Self {
        Self {
            listing_id: facts.listing_id.clone(),
            current_price: facts.current_price,
            proposed_price: facts.current_price,
            trail: Vec::new(),
            safety: SafetyVerdict::pass(),
            warnings,
            confidence: Decimal::ZERO,
            impact: None,
            evaluated_at: facts.as_of,
        }
    }
}

/// Evaluates pricing rules against facts: priority order, first match wins,
/// safety gate on the winner's candidate price.
#[derive(Clone, Debug, Default)]
pub struct RuleEngine {
    bounds: SafetyBounds,
}

impl RuleEngine {
    pub fn new(bounds: SafetyBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &SafetyBounds {
        &self.bounds
    }

    pub fn propose(&self, rules: &[PricingRule], facts: &Facts) -> Proposal {
        let mut warnings = Vec::new();

        for rule in ordered_active(rules) {
            let Some(matched) = match_conditions(rule, facts, &mut warnings) else {
                continue;
            };

            let Some(steps) = actions::apply_sequence(&rule.actions, facts) else {
                let cause = if rule.actions.iter().any(Action::is_unknown) {
                    "unrecognized action type"
                } else {
                    "competitor price unavailable"
                };
                warn!(event_name = "engine.rule_skipped", rule_id = %rule.id.0, cause);
                warnings.push(format!("rule `{}` skipped: {cause}", rule.id.0));
                continue;
            };
            if steps.is_empty() {
                continue;
            }

            let candidate = steps[steps.len() - 1].1;
            let trail = build_trail(rule, matched, &steps);
            let confidence = confidence_for(facts, candidate, &self.bounds);
            let verdict = safety::check(candidate, facts, &self.bounds);

            if !verdict.ok {
                warn!(
                    event_name = "engine.proposal_blocked",
                    rule_id = %rule.id.0,
                    listing_id = %facts.listing_id.0,
                    violations = verdict.violations.len()
                );
                return Proposal {
                    listing_id: facts.listing_id.clone(),
                    current_price: facts.current_price,
                    proposed_price: facts.current_price,
                    trail,
                    safety: verdict,
                    warnings,
                    confidence,
                    impact: None,
                    evaluated_at: facts.as_of,
                };
            }

            let impact = (candidate != facts.current_price)
                .then(|| estimate_impact(change_percent(facts.current_price, candidate)));

            return Proposal {
                listing_id: facts.listing_id.clone(),
                current_price: facts.current_price,
                proposed_price: candidate,
                trail,
                safety: verdict,
                warnings,
                confidence,
                impact,
                evaluated_at: facts.as_of,
            };
        }

        Proposal::noop(facts, warnings)
    }
}

fn ordered_active(rules: &[PricingRule]) -> Vec<&PricingRule> {
    let mut ordered: Vec<&PricingRule> = rules.iter().filter(|rule| rule.is_active).collect();
    ordered.sort_by(|left, right| {
        left.priority
            .cmp(&right.priority)
            .then_with(|| left.created_at.cmp(&right.created_at))
            .then_with(|| left.id.0.cmp(&right.id.0))
    });
    ordered
}

fn match_conditions(
    rule: &PricingRule,
    facts: &Facts,
    warnings: &mut Vec<String>,
) -> Option<Vec<String>> {
    let mut matched = Vec::with_capacity(rule.conditions.len());

    for condition in &rule.conditions {
        if condition.is_unknown() {
            warn!(event_name = "engine.unknown_condition", rule_id = %rule.id.0);
            warnings
                .push(format!("rule `{}` has an unrecognized condition and cannot match", rule.id.0));
            return None;
        }
        if !conditions::evaluate(condition, facts) {
            return None;
        }
        matched.push(condition.describe());
    }

    Some(matched)
}

fn build_trail(
    rule: &PricingRule,
    conditions_matched: Vec<String>,
    steps: &[(Action, Decimal)],
) -> Vec<TrailEntry> {
    steps
        .iter()
        .map(|(action, resulting_price)| TrailEntry {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            conditions_matched: conditions_matched.clone(),
            action_applied: action.describe(),
            resulting_price: *resulting_price,
        })
        .collect()
}

fn confidence_for(facts: &Facts, candidate: Decimal, bounds: &SafetyBounds) -> Decimal {
    let mut score = Decimal::new(50, 2);

    if facts.competitor_price.is_some() {
        score += Decimal::new(20, 2);
    }
    if candidate > Decimal::ZERO {
        let margin_percent = (candidate - facts.cost_price) / candidate * Decimal::ONE_HUNDRED;
        if margin_percent >= bounds.min_margin_percent + Decimal::new(5, 0) {
            score += Decimal::new(15, 2);
        }
    }
    if !facts.history.is_empty() {
        score += Decimal::new(10, 2);
    }

    score.min(Decimal::new(95, 2))
}

fn estimate_impact(price_change_percent: Decimal) -> ImpactEstimate {
    // crude constant-elasticity demand model
    let estimated_sales_change_percent =
        (price_change_percent * Decimal::new(-5, 1)).round_dp(2);
    ImpactEstimate {
        price_change_percent: price_change_percent.round_dp(2),
        estimated_sales_change_percent,
        risk_level: risk_level(price_change_percent),
    }
}

fn risk_level(price_change_percent: Decimal) -> RiskLevel {
    let magnitude = price_change_percent.abs();
    if magnitude > Decimal::new(15, 0) {
        RiskLevel::High
    } else if magnitude > Decimal::new(7, 0) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
