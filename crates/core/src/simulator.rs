//! What-if evaluation of the rule set against live listing state, without
//! persisting anything.
//!
//! Batch runs fan out listing fetches behind a semaphore and re-order the
//! joined results to input order, so output is deterministic regardless of
//! completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::listing::{Facts, ListingId};
use crate::domain::rule::{PricingRule, RuleId};
use crate::engine::{Proposal, RuleEngine, SafetyBounds, SafetyOverrides};
use crate::errors::ServiceError;
use crate::stores::{ListingStore, PriceHistoryStore, RuleStore, TimeWindow};

#[derive(Clone, Debug)]
pub struct SimulatorSettings {
    pub bounds: SafetyBounds,
    pub fan_out_limit: u32,
    pub batch_limit: u32,
    pub fetch_timeout: StdDuration,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            bounds: SafetyBounds::default(),
            fan_out_limit: 8,
            batch_limit: 100,
            fetch_timeout: StdDuration::from_millis(5_000),
        }
    }
}

/// One batch slot, in input order. Exactly one of `proposal`/`error` is set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSimulationEntry {
    pub listing_id: ListingId,
    pub proposal: Option<Proposal>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub changed: usize,
    pub blocked: usize,
    /// Mean change percent across listings that produced a proposal; `None`
    /// when every slot errored.
    pub avg_change_percent: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSimulation {
    pub results: Vec<BatchSimulationEntry>,
    pub summary: BatchSummary,
}

pub struct Simulator {
    listings: Arc<dyn ListingStore>,
    history: Arc<dyn PriceHistoryStore>,
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditSink>,
    settings: SimulatorSettings,
}

impl Simulator {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        history: Arc<dyn PriceHistoryStore>,
        rules: Arc<dyn RuleStore>,
        audit: Arc<dyn AuditSink>,
        settings: SimulatorSettings,
    ) -> Self {
        Self { listings, history, rules, audit, settings }
    }

    pub async fn simulate_one(
        &self,
        listing_id: &ListingId,
        rule_ids: Option<&[RuleId]>,
        overrides: Option<&SafetyOverrides>,
    ) -> Result<Proposal, ServiceError> {
        if listing_id.0.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("Listing id is required".to_owned()));
        }

        let rules = self.resolve_rules(rule_ids).await?;
        let facts = fetch_facts(
            &self.listings,
            &self.history,
            listing_id,
            self.settings.fetch_timeout,
            Utc::now(),
        )
        .await?;
        let proposal = self.engine(overrides).propose(&rules, &facts);

        info!(
            event_name = "simulation.completed",
            listing_id = %listing_id.0,
            changed = proposal.changed(),
            blocked = proposal.is_blocked()
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                Some(listing_id.clone()),
                listing_id.0.clone(),
                "simulation.completed",
                AuditCategory::Simulation,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("proposed_price", proposal.proposed_price.to_string()),
        );

        Ok(proposal)
    }

    pub async fn simulate_batch(
        &self,
        listing_ids: &[ListingId],
        rule_ids: Option<&[RuleId]>,
        overrides: Option<&SafetyOverrides>,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchSimulation, ServiceError> {
        if listing_ids.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "At least one listing id is required".to_owned(),
            ));
        }
        // The cap is enforced before any store access.
        if listing_ids.len() > self.settings.batch_limit as usize {
            return Err(ServiceError::InvalidArgument(format!(
                "Maximum {} listings per batch",
                self.settings.batch_limit
            )));
        }

        let rules = Arc::new(self.resolve_rules(rule_ids).await?);
        let engine = self.engine(overrides);
        let as_of = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.settings.fan_out_limit as usize));
        let mut join_set = JoinSet::new();

        for (index, listing_id) in listing_ids.iter().enumerate() {
            if cancelled(cancel) {
                return Err(ServiceError::Cancelled);
            }

            let semaphore = semaphore.clone();
            let listings = self.listings.clone();
            let history = self.history.clone();
            let rules = rules.clone();
            let engine = engine.clone();
            let listing_id = listing_id.clone();
            let fetch_timeout = self.settings.fetch_timeout;
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            BatchSimulationEntry {
                                listing_id,
                                proposal: None,
                                error: Some("concurrency limiter closed".to_string()),
                            },
                        );
                    }
                };
                let entry =
                    match fetch_facts(&listings, &history, &listing_id, fetch_timeout, as_of)
                        .await
                    {
                        Ok(facts) => BatchSimulationEntry {
                            listing_id,
                            proposal: Some(engine.propose(&rules, &facts)),
                            error: None,
                        },
                        Err(error) => BatchSimulationEntry {
                            listing_id,
                            proposal: None,
                            error: Some(error.to_string()),
                        },
                    };
                (index, entry)
            });
        }

        let mut slots: Vec<Option<BatchSimulationEntry>> =
            (0..listing_ids.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            if cancelled(cancel) {
                join_set.abort_all();
                return Err(ServiceError::Cancelled);
            }
            let (index, entry) = joined
                .map_err(|error| ServiceError::Unavailable(format!("batch task failed: {error}")))?;
            slots[index] = Some(entry);
        }

        let results: Vec<BatchSimulationEntry> = slots.into_iter().flatten().collect();
        let summary = summarize(&results);

        info!(
            event_name = "simulation.batch_completed",
            listings = results.len(),
            changed = summary.changed,
            blocked = summary.blocked
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                None,
                Uuid::new_v4().to_string(),
                "simulation.batch_completed",
                AuditCategory::Simulation,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("listings", results.len().to_string())
            .with_metadata("changed", summary.changed.to_string()),
        );

        Ok(BatchSimulation { results, summary })
    }

    /// Named subsets evaluate `active ∩ subset`; an absent or empty subset
    /// means all active rules.
    async fn resolve_rules(
        &self,
        rule_ids: Option<&[RuleId]>,
    ) -> Result<Vec<PricingRule>, ServiceError> {
        let rules = match rule_ids {
            Some(ids) if !ids.is_empty() => self.rules.find_by_ids(ids).await?,
            _ => self.rules.list(true).await?,
        };
        Ok(rules)
    }

    fn engine(&self, overrides: Option<&SafetyOverrides>) -> RuleEngine {
        let bounds = match overrides {
            Some(overrides) => self.settings.bounds.with_overrides(overrides),
            None => self.settings.bounds.clone(),
        };
        RuleEngine::new(bounds)
    }
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

async fn fetch_facts(
    listings: &Arc<dyn ListingStore>,
    history: &Arc<dyn PriceHistoryStore>,
    listing_id: &ListingId,
    fetch_timeout: StdDuration,
    as_of: DateTime<Utc>,
) -> Result<Facts, ServiceError> {
    let listing = timeout(fetch_timeout, listings.find_by_id(listing_id))
        .await
        .map_err(|_| fetch_timed_out("listing", fetch_timeout))??;
    let Some(listing) = listing else {
        return Err(ServiceError::NotFound { entity: "listing", id: listing_id.0.clone() });
    };

    let points = timeout(fetch_timeout, history.history_for(listing_id, &TimeWindow::default()))
        .await
        .map_err(|_| fetch_timed_out("price history", fetch_timeout))??;

    Ok(Facts::from_listing(&listing, points, as_of))
}

fn fetch_timed_out(what: &str, after: StdDuration) -> ServiceError {
    ServiceError::Unavailable(format!("{what} fetch timed out after {}ms", after.as_millis()))
}

fn summarize(results: &[BatchSimulationEntry]) -> BatchSummary {
    let mut changed = 0usize;
    let mut blocked = 0usize;
    let mut change_sum = Decimal::ZERO;
    let mut proposals = 0u32;

    for entry in results {
        let Some(proposal) = &entry.proposal else {
            continue;
        };
        proposals += 1;
        change_sum += proposal.change_percent();
        if proposal.changed() {
            changed += 1;
        }
        if proposal.is_blocked() {
            blocked += 1;
        }
    }

    let avg_change_percent =
        (proposals > 0).then(|| (change_sum / Decimal::from(proposals)).round_dp(2));
    BatchSummary { total: results.len(), changed, blocked, avg_change_percent }
}
