use rust_decimal::Decimal;

use crate::domain::listing::Facts;
use crate::domain::rule::Action;

/// Computes the next running price for one action, rounded to cents.
///
/// `None` means the action cannot produce a candidate with these facts
/// (competitor price missing, unrecognized action type); the caller skips the
/// whole rule in that case.
pub fn apply(action: &Action, price: Decimal, facts: &Facts) -> Option<Decimal> {
    let candidate = match action {
        Action::AdjustPercent { value } => price * (Decimal::ONE + *value / Decimal::ONE_HUNDRED),
        Action::AdjustAmount { value } => price + *value,
        Action::SetPrice { value } => *value,
        Action::MatchCompetitor { offset_percent } => {
            let competitor = facts.competitor_price?;
            competitor * (Decimal::ONE + *offset_percent / Decimal::ONE_HUNDRED)
        }
        Action::Unknown => return None,
    };

    Some(candidate.round_dp(2))
}

/// Runs a rule's actions in sequence starting from the current price. Each
/// step consumes the previous step's output.
pub fn apply_sequence(actions: &[Action], facts: &Facts) -> Option<Vec<(Action, Decimal)>> {
    let mut running = facts.current_price;
    let mut steps = Vec::with_capacity(actions.len());

    for action in actions {
        running = apply(action, running, facts)?;
        steps.push((action.clone(), running));
    }

    Some(steps)
}
