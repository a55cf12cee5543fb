//! Human-approval lifecycle for price recommendations.
//!
//! Status moves through compare-and-set updates on the backing store, so two
//! racing operators resolve to exactly one winner without row locks held in
//! application code. Expiry is checked lazily at the approval boundary; the
//! `expire_overdue` sweep is operator hygiene, not a correctness mechanism.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::listing::ListingId;
use crate::domain::recommendation::{Recommendation, RecommendationId, RecommendationStatus};
use crate::engine::Proposal;
use crate::errors::ServiceError;
use crate::stores::{
    ChangeLogStore, ListingStore, Page, RecommendationFilter, RecommendationStore, RuleStore,
    StatusChange,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ListingSummary {
    pub id: ListingId,
    pub title: String,
    pub current_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationListItem {
    pub recommendation: Recommendation,
    pub change_percent: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationPage {
    pub items: Vec<RecommendationListItem>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationDetail {
    pub recommendation: Recommendation,
    pub change_percent: Decimal,
    /// Joined listing summary; `None` when the listing has since vanished.
    pub listing: Option<ListingSummary>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WorkflowStats {
    pub period_days: i64,
    pub since: Option<DateTime<Utc>>,
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub applied: u64,
    pub expired: u64,
    pub price_changes: u64,
    pub active_rules: u64,
}

pub struct RecommendationWorkflow {
    recommendations: Arc<dyn RecommendationStore>,
    listings: Arc<dyn ListingStore>,
    changes: Arc<dyn ChangeLogStore>,
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditSink>,
    ttl: Duration,
}

impl RecommendationWorkflow {
    pub fn new(
        recommendations: Arc<dyn RecommendationStore>,
        listings: Arc<dyn ListingStore>,
        changes: Arc<dyn ChangeLogStore>,
        rules: Arc<dyn RuleStore>,
        audit: Arc<dyn AuditSink>,
        ttl: Duration,
    ) -> Self {
        Self { recommendations, listings, changes, rules, audit, ttl }
    }

    pub async fn list(
        &self,
        filter: RecommendationFilter,
        page: Page,
    ) -> Result<RecommendationPage, ServiceError> {
        let page = page.clamped();
        let (items, total) = self.recommendations.list(&filter, page).await?;
        let items = items
            .into_iter()
            .map(|recommendation| {
                let change_percent = recommendation.change_percent();
                RecommendationListItem { recommendation, change_percent }
            })
            .collect();
        Ok(RecommendationPage { items, total, limit: page.limit, offset: page.offset })
    }

    pub async fn get(&self, id: &RecommendationId) -> Result<RecommendationDetail, ServiceError> {
        let recommendation = self.load(id).await?;
        let listing = self.listings.find_by_id(&recommendation.listing_id).await?.map(|listing| {
            ListingSummary {
                id: listing.id,
                title: listing.title,
                current_price: listing.current_price,
            }
        });
        let change_percent = recommendation.change_percent();
        Ok(RecommendationDetail { recommendation, change_percent, listing })
    }

    /// Persists a PENDING recommendation from a proposal that actually moves
    /// the price and passed safety. Returns `None` for no-op or blocked
    /// proposals.
    pub async fn create_from_proposal(
        &self,
        proposal: &Proposal,
        actor: &str,
    ) -> Result<Option<Recommendation>, ServiceError> {
        if proposal.is_blocked() || !proposal.changed() {
            return Ok(None);
        }

        let now = Utc::now();
        let recommendation = Recommendation {
            id: RecommendationId(Uuid::new_v4().to_string()),
            listing_id: proposal.listing_id.clone(),
            current_price: proposal.current_price,
            recommended_price: proposal.proposed_price,
            reason: proposal.reason(),
            status: RecommendationStatus::Pending,
            expires_at: now + self.ttl,
            approved_by: None,
            rejected_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.recommendations.insert(recommendation.clone()).await?;

        info!(
            event_name = "workflow.recommendation_created",
            recommendation_id = %recommendation.id.0,
            listing_id = %recommendation.listing_id.0,
            change_percent = %recommendation.change_percent().round_dp(2)
        );
        self.audit_transition(&recommendation, "workflow.recommendation_created", actor);

        Ok(Some(recommendation))
    }

    pub async fn approve(
        &self,
        id: &RecommendationId,
        approved_by: &str,
    ) -> Result<Recommendation, ServiceError> {
        let mut recommendation = self.load(id).await?;
        if recommendation.status != RecommendationStatus::Pending {
            return Err(self.wrong_status("approve", &recommendation.status));
        }

        let now = Utc::now();
        if recommendation.is_expired(now) {
            // The row keeps PENDING at rest; only the caller learns it is
            // overdue.
            return Err(ServiceError::Expired { id: id.0.clone() });
        }

        let change = StatusChange {
            next: RecommendationStatus::Approved,
            approved_by: Some(approved_by.to_owned()),
            rejected_reason: None,
            updated_at: now,
        };
        if !self.recommendations.transition(id, RecommendationStatus::Pending, change).await? {
            return Err(self.lost_race("approve", id).await?);
        }

        recommendation.status = RecommendationStatus::Approved;
        recommendation.approved_by = Some(approved_by.to_owned());
        recommendation.updated_at = now;

        info!(
            event_name = "workflow.recommendation_approved",
            recommendation_id = %id.0,
            approved_by
        );
        self.audit_transition(&recommendation, "workflow.recommendation_approved", approved_by);

        Ok(recommendation)
    }

    pub async fn reject(
        &self,
        id: &RecommendationId,
        reason: &str,
    ) -> Result<Recommendation, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("Reason is required".to_owned()));
        }

        let mut recommendation = self.load(id).await?;
        if recommendation.status != RecommendationStatus::Pending {
            return Err(self.wrong_status("reject", &recommendation.status));
        }

        // Rejection of an overdue row is allowed; the operator is recording a
        // decision, not acting on a stale price.
        let now = Utc::now();
        let change = StatusChange {
            next: RecommendationStatus::Rejected,
            approved_by: None,
            rejected_reason: Some(reason.to_owned()),
            updated_at: now,
        };
        if !self.recommendations.transition(id, RecommendationStatus::Pending, change).await? {
            return Err(self.lost_race("reject", id).await?);
        }

        recommendation.status = RecommendationStatus::Rejected;
        recommendation.rejected_reason = Some(reason.to_owned());
        recommendation.updated_at = now;

        info!(event_name = "workflow.recommendation_rejected", recommendation_id = %id.0);
        self.audit_transition(&recommendation, "workflow.recommendation_rejected", "operator");

        Ok(recommendation)
    }

    /// Per-id independent; counts only rows that actually transitioned, so a
    /// retry after partial failure never double-approves.
    pub async fn bulk_approve(
        &self,
        ids: &[RecommendationId],
        approved_by: &str,
    ) -> Result<u64, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "At least one recommendation id is required".to_owned(),
            ));
        }

        let now = Utc::now();
        let mut approved = 0u64;
        for id in ids {
            let Some(recommendation) = self.recommendations.find_by_id(id).await? else {
                continue;
            };
            if recommendation.status != RecommendationStatus::Pending
                || recommendation.is_expired(now)
            {
                continue;
            }

            let change = StatusChange {
                next: RecommendationStatus::Approved,
                approved_by: Some(approved_by.to_owned()),
                rejected_reason: None,
                updated_at: now,
            };
            if self.recommendations.transition(id, RecommendationStatus::Pending, change).await? {
                approved += 1;
                let mut updated = recommendation;
                updated.status = RecommendationStatus::Approved;
                self.audit_transition(&updated, "workflow.recommendation_approved", approved_by);
            }
        }

        info!(
            event_name = "workflow.bulk_approved",
            requested = ids.len(),
            approved,
            approved_by
        );
        Ok(approved)
    }

    /// Entry point for the component that actually pushes prices: records
    /// that an approved recommendation took effect.
    pub async fn mark_applied(
        &self,
        id: &RecommendationId,
    ) -> Result<Recommendation, ServiceError> {
        let mut recommendation = self.load(id).await?;
        if recommendation.status != RecommendationStatus::Approved {
            return Err(self.wrong_status("apply", &recommendation.status));
        }

        let now = Utc::now();
        let change = StatusChange {
            next: RecommendationStatus::Applied,
            approved_by: None,
            rejected_reason: None,
            updated_at: now,
        };
        if !self.recommendations.transition(id, RecommendationStatus::Approved, change).await? {
            return Err(self.lost_race("apply", id).await?);
        }

        recommendation.status = RecommendationStatus::Applied;
        recommendation.updated_at = now;

        info!(event_name = "workflow.recommendation_applied", recommendation_id = %id.0);
        self.audit_transition(&recommendation, "workflow.recommendation_applied", "system");

        Ok(recommendation)
    }

    pub async fn stats(&self, days: i64) -> Result<WorkflowStats, ServiceError> {
        if days < 1 {
            return Err(ServiceError::InvalidArgument("days must be at least 1".to_owned()));
        }

        let since = Utc::now() - Duration::days(days);
        let mut stats =
            WorkflowStats { period_days: days, since: Some(since), ..WorkflowStats::default() };
        for (status, count) in self.recommendations.count_by_status_since(since).await? {
            stats.total += count;
            match status {
                RecommendationStatus::Pending => stats.pending = count,
                RecommendationStatus::Approved => stats.approved = count,
                RecommendationStatus::Rejected => stats.rejected = count,
                RecommendationStatus::Applied => stats.applied = count,
                RecommendationStatus::Expired => stats.expired = count,
            }
        }
        stats.price_changes = self.changes.count_since(since).await?;
        stats.active_rules = self.rules.count_active().await?;
        Ok(stats)
    }

    pub async fn expire_overdue(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let expired = self.recommendations.expire_overdue(now).await?;
        if expired > 0 {
            info!(event_name = "workflow.recommendations_expired", count = expired);
            self.audit.emit(
                AuditEvent::new(
                    None,
                    None,
                    Uuid::new_v4().to_string(),
                    "workflow.recommendations_expired",
                    AuditCategory::Workflow,
                    "system",
                    AuditOutcome::Success,
                )
                .with_metadata("count", expired.to_string()),
            );
        }
        Ok(expired)
    }

    async fn load(&self, id: &RecommendationId) -> Result<Recommendation, ServiceError> {
        let Some(recommendation) = self.recommendations.find_by_id(id).await? else {
            return Err(ServiceError::NotFound { entity: "recommendation", id: id.0.clone() });
        };
        Ok(recommendation)
    }

    fn wrong_status(&self, verb: &str, status: &RecommendationStatus) -> ServiceError {
        ServiceError::InvalidState(format!("Cannot {verb} recommendation in status {status}"))
    }

    /// After a lost compare-and-set, re-reads the row so the caller sees the
    /// status that beat them.
    async fn lost_race(
        &self,
        verb: &str,
        id: &RecommendationId,
    ) -> Result<ServiceError, ServiceError> {
        let current = self.load(id).await?;
        Ok(self.wrong_status(verb, &current.status))
    }

    fn audit_transition(&self, recommendation: &Recommendation, event_type: &str, actor: &str) {
        self.audit.emit(
            AuditEvent::new(
                Some(recommendation.id.clone()),
                Some(recommendation.listing_id.clone()),
                recommendation.id.0.clone(),
                event_type,
                AuditCategory::Workflow,
                actor,
                AuditOutcome::Success,
            )
            .with_metadata("status", recommendation.status.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::listing::{Listing, ListingId};
    use crate::domain::recommendation::{
        Recommendation, RecommendationId, RecommendationStatus,
    };
    use crate::domain::rule::RuleId;
    use crate::engine::{Proposal, SafetyVerdict, SafetyViolation, TrailEntry};
    use crate::errors::ServiceError;
    use crate::stores::{
        InMemoryChangeLogStore, InMemoryListingStore, InMemoryRecommendationStore,
        InMemoryRuleStore, Page, RecommendationFilter, RecommendationStore,
    };

    use super::RecommendationWorkflow;

    struct Harness {
        workflow: RecommendationWorkflow,
        recommendations: Arc<InMemoryRecommendationStore>,
        listings: Arc<InMemoryListingStore>,
        sink: InMemoryAuditSink,
    }

    fn harness() -> Harness {
        let recommendations = Arc::new(InMemoryRecommendationStore::default());
        let listings = Arc::new(InMemoryListingStore::default());
        let changes = Arc::new(InMemoryChangeLogStore::default());
        let rules = Arc::new(InMemoryRuleStore::default());
        let sink = InMemoryAuditSink::default();
        let workflow = RecommendationWorkflow::new(
            recommendations.clone(),
            listings.clone(),
            changes,
            rules,
            Arc::new(sink.clone()),
            Duration::hours(24),
        );
        Harness { workflow, recommendations, listings, sink }
    }

    fn pending(id: &str, expires_in: Duration) -> Recommendation {
        let now = Utc::now();
        Recommendation {
            id: RecommendationId(id.to_string()),
            listing_id: ListingId("lst-1".to_string()),
            current_price: Decimal::new(10000, 2),
            recommended_price: Decimal::new(9700, 2),
            reason: "rule `undercut` matched".to_string(),
            status: RecommendationStatus::Pending,
            expires_at: now + expires_in,
            approved_by: None,
            rejected_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn proposal() -> Proposal {
        Proposal {
            listing_id: ListingId("lst-1".to_string()),
            current_price: Decimal::new(10000, 2),
            proposed_price: Decimal::new(9700, 2),
            trail: vec![TrailEntry {
                rule_id: RuleId("rule-1".to_string()),
                rule_name: "undercut".to_string(),
                conditions_matched: vec!["competitor at least 5% lower".to_string()],
                action_applied: "adjust by -3%".to_string(),
                resulting_price: Decimal::new(9700, 2),
            }],
            safety: SafetyVerdict::pass(),
            warnings: Vec::new(),
            confidence: Decimal::new(70, 2),
            impact: None,
            evaluated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_from_proposal_persists_pending_with_reason() {
        let harness = harness();

        let created = harness
            .workflow
            .create_from_proposal(&proposal(), "engine")
            .await
            .expect("create should succeed")
            .expect("a changed proposal should persist");

        assert_eq!(created.status, RecommendationStatus::Pending);
        assert_eq!(
            created.reason,
            "rule `undercut` matched (competitor at least 5% lower); adjust by -3%"
        );
        assert!(created.expires_at > created.created_at);

        let stored = harness
            .recommendations
            .find_by_id(&created.id)
            .await
            .unwrap()
            .expect("row should be stored");
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn noop_and_blocked_proposals_create_nothing() {
        let harness = harness();

        let mut unchanged = proposal();
        unchanged.proposed_price = unchanged.current_price;
        unchanged.trail.clear();
        assert!(harness
            .workflow
            .create_from_proposal(&unchanged, "engine")
            .await
            .unwrap()
            .is_none());

        let mut blocked = proposal();
        blocked.proposed_price = blocked.current_price;
        blocked.safety = SafetyVerdict {
            ok: false,
            violations: vec![SafetyViolation::StepTooLarge {
                step_percent: Decimal::new(40, 0),
                max_step_percent: Decimal::new(20, 0),
            }],
        };
        assert!(harness
            .workflow
            .create_from_proposal(&blocked, "engine")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn approve_sets_approver_and_audits() {
        let harness = harness();
        let rec = pending("rec-1", Duration::hours(12));
        harness.recommendations.insert(rec.clone()).await.unwrap();

        let approved =
            harness.workflow.approve(&rec.id, "ops@example.com").await.expect("approve");
        assert_eq!(approved.status, RecommendationStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("ops@example.com"));

        let stored = harness.recommendations.find_by_id(&rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecommendationStatus::Approved);

        let events = harness.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "workflow.recommendation_approved");
        assert_eq!(events[0].actor, "ops@example.com");
    }

    #[tokio::test]
    async fn approve_after_reject_reports_current_status() {
        let harness = harness();
        let rec = pending("rec-1", Duration::hours(12));
        harness.recommendations.insert(rec.clone()).await.unwrap();

        harness.workflow.reject(&rec.id, "price war is over").await.expect("reject");

        let error = harness
            .workflow
            .approve(&rec.id, "ops@example.com")
            .await
            .expect_err("approve should fail");
        assert_eq!(
            error,
            ServiceError::InvalidState(
                "Cannot approve recommendation in status REJECTED".to_string()
            )
        );
    }

    #[tokio::test]
    async fn approve_overdue_pending_fails_and_leaves_row_pending() {
        let harness = harness();
        let mut rec = pending("rec-1", Duration::hours(12));
        rec.expires_at = Utc::now() - Duration::seconds(5);
        harness.recommendations.insert(rec.clone()).await.unwrap();

        let error = harness
            .workflow
            .approve(&rec.id, "ops@example.com")
            .await
            .expect_err("expired approval should fail");
        assert!(matches!(error, ServiceError::Expired { .. }));

        let stored = harness.recommendations.find_by_id(&rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecommendationStatus::Pending);
    }

    #[tokio::test]
    async fn reject_requires_a_reason_but_ignores_expiry() {
        let harness = harness();
        let mut rec = pending("rec-1", Duration::hours(12));
        rec.expires_at = Utc::now() - Duration::hours(1);
        harness.recommendations.insert(rec.clone()).await.unwrap();

        let error =
            harness.workflow.reject(&rec.id, "   ").await.expect_err("blank reason should fail");
        assert_eq!(error, ServiceError::InvalidArgument("Reason is required".to_string()));

        let rejected =
            harness.workflow.reject(&rec.id, "stale competitor data").await.expect("reject");
        assert_eq!(rejected.status, RecommendationStatus::Rejected);
        assert_eq!(rejected.rejected_reason.as_deref(), Some("stale competitor data"));
    }

    #[tokio::test]
    async fn bulk_approve_counts_only_real_transitions() {
        let harness = harness();
        let fresh = pending("rec-fresh", Duration::hours(12));
        let mut overdue = pending("rec-overdue", Duration::hours(12));
        overdue.expires_at = Utc::now() - Duration::hours(1);
        let mut rejected = pending("rec-rejected", Duration::hours(12));
        rejected.status = RecommendationStatus::Rejected;
        harness.recommendations.insert(fresh.clone()).await.unwrap();
        harness.recommendations.insert(overdue.clone()).await.unwrap();
        harness.recommendations.insert(rejected.clone()).await.unwrap();

        let ids = vec![
            fresh.id.clone(),
            overdue.id.clone(),
            rejected.id.clone(),
            RecommendationId("rec-missing".to_string()),
        ];
        let approved = harness.workflow.bulk_approve(&ids, "ops").await.expect("bulk");
        assert_eq!(approved, 1);

        let stored = harness.recommendations.find_by_id(&fresh.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecommendationStatus::Approved);
        let untouched = harness.recommendations.find_by_id(&overdue.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, RecommendationStatus::Pending);

        let error =
            harness.workflow.bulk_approve(&[], "ops").await.expect_err("empty ids should fail");
        assert!(matches!(error, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn mark_applied_requires_approved_status() {
        let harness = harness();
        let rec = pending("rec-1", Duration::hours(12));
        harness.recommendations.insert(rec.clone()).await.unwrap();

        let error =
            harness.workflow.mark_applied(&rec.id).await.expect_err("pending cannot apply");
        assert_eq!(
            error,
            ServiceError::InvalidState("Cannot apply recommendation in status PENDING".to_string())
        );

        harness.workflow.approve(&rec.id, "ops").await.unwrap();
        let applied = harness.workflow.mark_applied(&rec.id).await.expect("apply");
        assert_eq!(applied.status, RecommendationStatus::Applied);
    }

    #[tokio::test]
    async fn concurrent_approvals_resolve_to_one_winner() {
        let harness = harness();
        let rec = pending("rec-1", Duration::hours(12));
        harness.recommendations.insert(rec.clone()).await.unwrap();

        let (left, right) = tokio::join!(
            harness.workflow.approve(&rec.id, "first@example.com"),
            harness.workflow.approve(&rec.id, "second@example.com"),
        );

        let winners = [&left, &right].iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if left.is_ok() { right } else { left };
        assert!(matches!(loser, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn list_derives_change_percent_and_paginates() {
        let harness = harness();
        for index in 0..3 {
            let mut rec = pending(&format!("rec-{index}"), Duration::hours(12));
            rec.created_at = Utc::now() + Duration::minutes(index);
            harness.recommendations.insert(rec).await.unwrap();
        }

        let page = harness
            .workflow
            .list(RecommendationFilter::default(), Page { limit: 2, offset: 0 })
            .await
            .expect("list");
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].recommendation.id.0, "rec-2");
        assert_eq!(page.items[0].change_percent, Decimal::new(-3, 0));
    }

    #[tokio::test]
    async fn get_joins_listing_summary_when_present() {
        let harness = harness();
        let rec = pending("rec-1", Duration::hours(12));
        harness.recommendations.insert(rec.clone()).await.unwrap();
        harness.listings.insert(Listing {
            id: ListingId("lst-1".to_string()),
            title: "usb-c dock".to_string(),
            current_price: Decimal::new(10000, 2),
            cost_price: Decimal::new(7000, 2),
            competitor_price: None,
            sales_velocity: None,
            updated_at: Utc::now(),
        });

        let detail = harness.workflow.get(&rec.id).await.expect("get");
        assert_eq!(detail.listing.as_ref().map(|l| l.title.as_str()), Some("usb-c dock"));
        assert_eq!(detail.change_percent, Decimal::new(-3, 0));

        let missing = harness
            .workflow
            .get(&RecommendationId("rec-404".to_string()))
            .await
            .expect_err("missing should fail");
        assert!(matches!(missing, ServiceError::NotFound { entity: "recommendation", .. }));
    }

    #[tokio::test]
    async fn expire_overdue_then_approve_reports_expired_status() {
        let harness = harness();
        let mut rec = pending("rec-1", Duration::hours(12));
        rec.expires_at = Utc::now() - Duration::hours(1);
        harness.recommendations.insert(rec.clone()).await.unwrap();

        let expired = harness.workflow.expire_overdue().await.expect("sweep");
        assert_eq!(expired, 1);

        let error =
            harness.workflow.approve(&rec.id, "ops").await.expect_err("approve should fail");
        assert_eq!(
            error,
            ServiceError::InvalidState(
                "Cannot approve recommendation in status EXPIRED".to_string()
            )
        );
    }

    #[tokio::test]
    async fn stats_aggregate_counts_by_status() {
        let harness = harness();
        let fresh = pending("rec-1", Duration::hours(12));
        let mut approved = pending("rec-2", Duration::hours(12));
        approved.status = RecommendationStatus::Approved;
        harness.recommendations.insert(fresh).await.unwrap();
        harness.recommendations.insert(approved).await.unwrap();

        let stats = harness.workflow.stats(30).await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.period_days, 30);

        let error = harness.workflow.stats(0).await.expect_err("zero days should fail");
        assert!(matches!(error, ServiceError::InvalidArgument(_)));
    }
}
