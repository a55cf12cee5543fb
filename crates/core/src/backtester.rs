//! Replays rules against historical price points to estimate their effect
//! before activation.
//!
//! Each rule is replayed independently rather than through the first-match
//! pass, since the question is what each rule would do on its own. A replay
//! point becomes a synthetic facts snapshot: the historical price is the
//! current price, the evaluation clock is the point's timestamp, and the
//! history is the prefix recorded up to that point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::listing::{Facts, Listing, ListingId, PriceHistoryPoint};
use crate::domain::recommendation::change_percent;
use crate::domain::rule::{PricingRule, RuleId};
use crate::engine::{RuleEngine, SafetyBounds, SafetyOverrides};
use crate::errors::ServiceError;
use crate::stores::{ListingStore, PriceHistoryStore, RuleStore, TimeWindow};

#[derive(Clone, Debug)]
pub struct BacktesterSettings {
    pub bounds: SafetyBounds,
    pub fan_out_limit: u32,
    /// How many listings a backtest covers when the caller names none.
    pub listing_limit: u32,
    pub fetch_timeout: StdDuration,
    pub default_sample_size: usize,
}

impl Default for BacktesterSettings {
    fn default() -> Self {
        Self {
            bounds: SafetyBounds::default(),
            fan_out_limit: 8,
            listing_limit: 100,
            fetch_timeout: StdDuration::from_millis(5_000),
            default_sample_size: 50,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BacktestRequest {
    pub rule_ids: Vec<RuleId>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub sample_size: Option<usize>,
    pub listing_ids: Option<Vec<ListingId>>,
    pub overrides: Option<SafetyOverrides>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BacktestPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub rules_evaluated: usize,
    pub listings_analyzed: usize,
    pub points_replayed: usize,
    pub matches: usize,
    pub blocks: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleBacktest {
    pub rule_id: RuleId,
    pub rule_name: String,
    /// Points replayed for this rule (shared across rules).
    pub samples: usize,
    pub matches: usize,
    pub match_rate: f64,
    /// Mean candidate change percent across matched replays; `None` when the
    /// rule never matched, never NaN.
    pub avg_change_percent: Option<Decimal>,
    pub blocks: usize,
    pub block_rate: f64,
}

/// Spread of the candidate change percents pooled across all rules. The
/// candidate is taken before the guard verdict, so a rule that keeps
/// proposing oversized steps shows up here even though every one of them
/// would have been blocked.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskAnalysis {
    pub samples: usize,
    pub variance: f64,
    pub std_dev: f64,
    pub exceeding_max_step: usize,
    pub exceeding_max_step_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BacktestReport {
    pub period: BacktestPeriod,
    pub summary: BacktestSummary,
    pub by_rule: Vec<RuleBacktest>,
    pub risk_analysis: RiskAnalysis,
}

pub struct Backtester {
    listings: Arc<dyn ListingStore>,
    history: Arc<dyn PriceHistoryStore>,
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditSink>,
    settings: BacktesterSettings,
}

struct RuleTally {
    matches: usize,
    blocks: usize,
    change_sum: Decimal,
}

impl Backtester {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        history: Arc<dyn PriceHistoryStore>,
        rules: Arc<dyn RuleStore>,
        audit: Arc<dyn AuditSink>,
        settings: BacktesterSettings,
    ) -> Self {
        Self { listings, history, rules, audit, settings }
    }

    pub async fn run(
        &self,
        request: BacktestRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<BacktestReport, ServiceError> {
        if request.rule_ids.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "At least one rule id is required".to_owned(),
            ));
        }
        let sample_size = request.sample_size.unwrap_or(self.settings.default_sample_size);
        if sample_size == 0 {
            return Err(ServiceError::InvalidArgument(
                "sample_size must be at least 1".to_owned(),
            ));
        }

        // Inactive rules replay too: estimating a rule before switching it on
        // is the point of a backtest.
        let rules: Vec<PricingRule> = self
            .rules
            .find_by_ids(&request.rule_ids)
            .await?
            .into_iter()
            .map(|mut rule| {
                rule.is_active = true;
                rule
            })
            .collect();
        if rules.is_empty() {
            let ids: Vec<&str> = request.rule_ids.iter().map(|id| id.0.as_str()).collect();
            return Err(ServiceError::NotFound { entity: "rule", id: ids.join(", ") });
        }

        let listing_ids = match &request.listing_ids {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => self.listings.list_ids(self.settings.listing_limit).await?,
        };
        let window = TimeWindow { start: request.start, end: request.end };
        let datasets = self.fetch_datasets(&listing_ids, &window, cancel).await?;

        let bounds = match &request.overrides {
            Some(overrides) => self.settings.bounds.with_overrides(overrides),
            None => self.settings.bounds.clone(),
        };
        let engine = RuleEngine::new(bounds.clone());

        let mut tallies: Vec<RuleTally> = rules
            .iter()
            .map(|_| RuleTally { matches: 0, blocks: 0, change_sum: Decimal::ZERO })
            .collect();
        let mut candidate_changes: Vec<f64> = Vec::new();
        let mut points_replayed = 0usize;
        let mut listings_analyzed = 0usize;
        let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

        for (listing, points) in &datasets {
            if cancelled(cancel) {
                return Err(ServiceError::Cancelled);
            }
            if points.is_empty() {
                continue;
            }
            listings_analyzed += 1;
            span = widen(span, points);

            for index in sampled_indices(points.len(), sample_size) {
                points_replayed += 1;
                let facts = synthetic_facts(listing, points, index);

                for (rule, tally) in rules.iter().zip(tallies.iter_mut()) {
                    let proposal = engine.propose(std::slice::from_ref(rule), &facts);
                    let Some(last) = proposal.trail.last() else {
                        continue;
                    };

                    tally.matches += 1;
                    if proposal.is_blocked() {
                        tally.blocks += 1;
                    }

                    let candidate = change_percent(facts.current_price, last.resulting_price);
                    tally.change_sum += candidate;
                    candidate_changes.push(candidate.to_f64().unwrap_or(0.0));
                }
            }
        }

        let now = Utc::now();
        let period = BacktestPeriod {
            start: request.start.or(span.map(|(start, _)| start)).unwrap_or(now),
            end: request.end.or(span.map(|(_, end)| end)).unwrap_or(now),
        };

        let by_rule: Vec<RuleBacktest> = rules
            .iter()
            .zip(tallies.iter())
            .map(|(rule, tally)| RuleBacktest {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                samples: points_replayed,
                matches: tally.matches,
                match_rate: rate(tally.matches, points_replayed),
                avg_change_percent: (tally.matches > 0)
                    .then(|| (tally.change_sum / Decimal::from(tally.matches as u64)).round_dp(2)),
                blocks: tally.blocks,
                block_rate: rate(tally.blocks, points_replayed),
            })
            .collect();

        let summary = BacktestSummary {
            rules_evaluated: rules.len(),
            listings_analyzed,
            points_replayed,
            matches: tallies.iter().map(|tally| tally.matches).sum(),
            blocks: tallies.iter().map(|tally| tally.blocks).sum(),
        };
        let risk_analysis = risk_analysis(&candidate_changes, bounds.max_step_percent);

        info!(
            event_name = "backtest.completed",
            rules = summary.rules_evaluated,
            listings = summary.listings_analyzed,
            points = summary.points_replayed,
            matches = summary.matches
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                None,
                Uuid::new_v4().to_string(),
                "backtest.completed",
                AuditCategory::Backtest,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("rules", summary.rules_evaluated.to_string())
            .with_metadata("points", summary.points_replayed.to_string()),
        );

        Ok(BacktestReport { period, summary, by_rule, risk_analysis })
    }

    /// Concurrent listing+history fetch, bounded by the fan-out limit.
    /// Listings that no longer resolve are skipped; the report only covers
    /// what could be loaded.
    async fn fetch_datasets(
        &self,
        listing_ids: &[ListingId],
        window: &TimeWindow,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<(Listing, Vec<PriceHistoryPoint>)>, ServiceError> {
        let semaphore = Arc::new(Semaphore::new(self.settings.fan_out_limit as usize));
        let mut join_set = JoinSet::new();

        for (index, listing_id) in listing_ids.iter().enumerate() {
            if cancelled(cancel) {
                return Err(ServiceError::Cancelled);
            }

            let semaphore = semaphore.clone();
            let listings = self.listings.clone();
            let history = self.history.clone();
            let listing_id = listing_id.clone();
            let window = *window;
            let fetch_timeout = self.settings.fetch_timeout;
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Ok((index, None)),
                };

                let listing = timeout(fetch_timeout, listings.find_by_id(&listing_id))
                    .await
                    .map_err(|_| unavailable("listing", fetch_timeout))?
                    .map_err(ServiceError::from)?;
                let Some(listing) = listing else {
                    return Ok((index, None));
                };

                let points = timeout(fetch_timeout, history.history_for(&listing_id, &window))
                    .await
                    .map_err(|_| unavailable("price history", fetch_timeout))?
                    .map_err(ServiceError::from)?;
                Ok::<_, ServiceError>((index, Some((listing, points))))
            });
        }

        let mut slots: Vec<Option<(Listing, Vec<PriceHistoryPoint>)>> =
            (0..listing_ids.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            if cancelled(cancel) {
                join_set.abort_all();
                return Err(ServiceError::Cancelled);
            }
            let (index, dataset) = joined
                .map_err(|error| ServiceError::Unavailable(format!("fetch task failed: {error}")))??;
            slots[index] = dataset;
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

fn unavailable(what: &str, after: StdDuration) -> ServiceError {
    ServiceError::Unavailable(format!("{what} fetch timed out after {}ms", after.as_millis()))
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64
}

fn widen(
    span: Option<(DateTime<Utc>, DateTime<Utc>)>,
    points: &[PriceHistoryPoint],
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return span;
    };
    Some(match span {
        Some((start, end)) => (start.min(first.recorded_at), end.max(last.recorded_at)),
        None => (first.recorded_at, last.recorded_at),
    })
}

/// Evenly spaced indices over `len` points, first and last included, at most
/// `sample_size` of them.
fn sampled_indices(len: usize, sample_size: usize) -> Vec<usize> {
    if len <= sample_size {
        return (0..len).collect();
    }
    if sample_size == 1 {
        return vec![0];
    }

    let mut indices: Vec<usize> =
        (0..sample_size).map(|i| i * (len - 1) / (sample_size - 1)).collect();
    indices.dedup();
    indices
}

fn synthetic_facts(listing: &Listing, points: &[PriceHistoryPoint], index: usize) -> Facts {
    let point = &points[index];
    Facts {
        listing_id: listing.id.clone(),
        current_price: point.price,
        cost_price: listing.cost_price,
        competitor_price: listing.competitor_price,
        sales_velocity: listing.sales_velocity,
        history: points[..=index].to_vec(),
        as_of: point.recorded_at,
    }
}

fn risk_analysis(changes: &[f64], max_step_percent: Decimal) -> RiskAnalysis {
    let samples = changes.len();
    let max_step = max_step_percent.to_f64().unwrap_or(0.0);
    let exceeding = changes.iter().filter(|change| change.abs() > max_step).count();

    if samples < 2 {
        return RiskAnalysis {
            samples,
            variance: 0.0,
            std_dev: 0.0,
            exceeding_max_step: exceeding,
            exceeding_max_step_rate: rate(exceeding, samples),
        };
    }

    let mean = changes.iter().sum::<f64>() / samples as f64;
    let variance =
        changes.iter().map(|change| (change - mean).powi(2)).sum::<f64>() / (samples - 1) as f64;

    RiskAnalysis {
        samples,
        variance,
        std_dev: variance.sqrt(),
        exceeding_max_step: exceeding,
        exceeding_max_step_rate: rate(exceeding, samples),
    }
}
