use chrono::Duration;
use rust_decimal::Decimal;

use crate::domain::listing::Facts;
use crate::domain::rule::Condition;

/// Evaluates a single condition against the facts snapshot.
///
/// Unknown condition types never match. Ratio conditions are false when the
/// current price is not positive rather than dividing by zero.
pub fn evaluate(condition: &Condition, facts: &Facts) -> bool {
    match condition {
        Condition::CompetitorLower { threshold } => {
            let Some(competitor) = facts.competitor_price else {
                return false;
            };
            let Some(gap) = percent_of_current(facts, facts.current_price - competitor) else {
                return false;
            };
            gap >= *threshold
        }
        Condition::MarginBelow { threshold } => {
            let Some(margin) = percent_of_current(facts, facts.current_price - facts.cost_price)
            else {
                return false;
            };
            margin < *threshold
        }
        Condition::PriceUnchangedFor { days } => price_unchanged_for(facts, *days),
        Condition::StockVelocityBelow { units_per_week } => facts
            .sales_velocity
            .map(|velocity| velocity < *units_per_week)
            .unwrap_or(false),
        Condition::Unknown => false,
    }
}

fn percent_of_current(facts: &Facts, numerator: Decimal) -> Option<Decimal> {
    if facts.current_price <= Decimal::ZERO {
        return None;
    }
    Some(numerator / facts.current_price * Decimal::ONE_HUNDRED)
}

fn price_unchanged_for(facts: &Facts, days: i64) -> bool {
    if days < 0 {
        return false;
    }

    let window_start = facts.as_of - Duration::days(days);
    facts
        .history
        .iter()
        .filter(|point| point.recorded_at >= window_start)
        .all(|point| point.price == facts.current_price)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::listing::{Facts, ListingId, PriceHistoryPoint};
    use crate::domain::rule::Condition;

    use super::evaluate;

    fn facts(current: i64, cost: i64, competitor: Option<i64>) -> Facts {
        Facts {
            listing_id: ListingId("lst-1".to_string()),
            current_price: Decimal::new(current, 0),
            cost_price: Decimal::new(cost, 0),
            competitor_price: competitor.map(|value| Decimal::new(value, 0)),
            sales_velocity: None,
            history: Vec::new(),
            as_of: Utc::now(),
        }
    }

    fn with_history(mut facts: Facts, prices_by_days_ago: &[(i64, i64)]) -> Facts {
        facts.history = prices_by_days_ago
            .iter()
            .map(|(days_ago, price)| PriceHistoryPoint {
                listing_id: facts.listing_id.clone(),
                price: Decimal::new(*price, 0),
                recorded_at: facts.as_of - Duration::days(*days_ago),
            })
            .collect();
        facts
    }

    #[test]
    fn competitor_lower_matches_at_threshold() {
        let condition = Condition::CompetitorLower { threshold: Decimal::new(10, 0) };
        assert!(evaluate(&condition, &facts(100, 70, Some(90))));
    }

    #[test]
    fn competitor_lower_misses_below_threshold() {
        let condition = Condition::CompetitorLower { threshold: Decimal::new(11, 0) };
        assert!(!evaluate(&condition, &facts(100, 70, Some(90))));
    }

    #[test]
    fn competitor_lower_requires_known_competitor_price() {
        let condition = Condition::CompetitorLower { threshold: Decimal::new(1, 0) };
        assert!(!evaluate(&condition, &facts(100, 70, None)));
    }

    #[test]
    fn competitor_lower_with_zero_current_price_is_false() {
        let condition = Condition::CompetitorLower { threshold: Decimal::new(1, 0) };
        assert!(!evaluate(&condition, &facts(0, 70, Some(90))));
    }

    #[test]
    fn margin_below_matches_thin_margin() {
        let condition = Condition::MarginBelow { threshold: Decimal::new(35, 0) };
        assert!(evaluate(&condition, &facts(100, 70, None)));
    }

    #[test]
    fn margin_below_misses_exact_threshold() {
        // margin is exactly 30%, the condition wants strictly below
        let condition = Condition::MarginBelow { threshold: Decimal::new(30, 0) };
        assert!(!evaluate(&condition, &facts(100, 70, None)));
    }

    #[test]
    fn price_unchanged_matches_when_window_is_flat() {
        let condition = Condition::PriceUnchangedFor { days: 7 };
        let facts = with_history(facts(100, 70, None), &[(2, 100), (5, 100), (12, 80)]);
        assert!(evaluate(&condition, &facts));
    }

    #[test]
    fn price_unchanged_misses_when_window_has_a_change() {
        let condition = Condition::PriceUnchangedFor { days: 7 };
        let facts = with_history(facts(100, 70, None), &[(2, 100), (5, 95)]);
        assert!(!evaluate(&condition, &facts));
    }

    #[test]
    fn price_unchanged_is_vacuously_true_without_history() {
        let condition = Condition::PriceUnchangedFor { days: 7 };
        assert!(evaluate(&condition, &facts(100, 70, None)));
    }

    #[test]
    fn stock_velocity_requires_known_velocity() {
        let condition = Condition::StockVelocityBelow { units_per_week: Decimal::new(3, 0) };
        assert!(!evaluate(&condition, &facts(100, 70, None)));
    }

    #[test]
    fn stock_velocity_matches_slow_mover() {
        let condition = Condition::StockVelocityBelow { units_per_week: Decimal::new(3, 0) };
        let mut facts = facts(100, 70, None);
        facts.sales_velocity = Some(Decimal::new(1, 0));
        assert!(evaluate(&condition, &facts));
    }

    #[test]
    fn unknown_condition_never_matches() {
        assert!(!evaluate(&Condition::Unknown, &facts(100, 70, Some(50))));
    }
}
