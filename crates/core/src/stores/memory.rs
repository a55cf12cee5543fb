//! In-memory store implementations backing unit tests and the demo paths
//! that do not want a database file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::listing::{Listing, ListingId, PriceChangeLogEntry, PriceHistoryPoint};
use crate::domain::recommendation::{Recommendation, RecommendationId, RecommendationStatus};
use crate::domain::rule::{PricingRule, RuleId};

use super::{
    ChangeLogStore, ListingStore, Page, PriceHistoryStore, RecommendationFilter,
    RecommendationStore, RuleStore, StatusChange, StoreError, TimeWindow,
};

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct InMemoryListingStore {
    listings: Mutex<HashMap<String, Listing>>,
    fetches: AtomicU64,
}

impl InMemoryListingStore {
    pub fn insert(&self, listing: Listing) {
        lock_or_recover(&self.listings).insert(listing.id.0.clone(), listing);
    }

    /// Number of `find_by_id` calls served so far. Lets tests assert that a
    /// rejected batch never touched the catalog.
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, StoreError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(lock_or_recover(&self.listings).get(&id.0).cloned())
    }

    async fn list_ids(&self, limit: u32) -> Result<Vec<ListingId>, StoreError> {
        let guard = lock_or_recover(&self.listings);
        let mut ids: Vec<String> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids.into_iter().take(limit as usize).map(ListingId).collect())
    }
}

#[derive(Default)]
pub struct InMemoryPriceHistoryStore {
    points: Mutex<HashMap<String, Vec<PriceHistoryPoint>>>,
}

impl InMemoryPriceHistoryStore {
    pub fn record(&self, point: PriceHistoryPoint) {
        lock_or_recover(&self.points)
            .entry(point.listing_id.0.clone())
            .or_default()
            .push(point);
    }
}

#[async_trait]
impl PriceHistoryStore for InMemoryPriceHistoryStore {
    async fn history_for(
        &self,
        listing_id: &ListingId,
        window: &TimeWindow,
    ) -> Result<Vec<PriceHistoryPoint>, StoreError> {
        let guard = lock_or_recover(&self.points);
        let mut points: Vec<PriceHistoryPoint> = guard
            .get(&listing_id.0)
            .map(|points| {
                points.iter().filter(|point| window.contains(point.recorded_at)).cloned().collect()
            })
            .unwrap_or_default();
        points.sort_by(|left, right| left.recorded_at.cmp(&right.recorded_at));
        Ok(points)
    }
}

#[derive(Default)]
pub struct InMemoryChangeLogStore {
    entries: Mutex<HashMap<String, Vec<PriceChangeLogEntry>>>,
}

impl InMemoryChangeLogStore {
    pub fn record(&self, entry: PriceChangeLogEntry) {
        lock_or_recover(&self.entries)
            .entry(entry.listing_id.0.clone())
            .or_default()
            .push(entry);
    }
}

#[async_trait]
impl ChangeLogStore for InMemoryChangeLogStore {
    async fn changes_for(
        &self,
        listing_id: &ListingId,
        window: &TimeWindow,
    ) -> Result<Vec<PriceChangeLogEntry>, StoreError> {
        let guard = lock_or_recover(&self.entries);
        let mut entries: Vec<PriceChangeLogEntry> = guard
            .get(&listing_id.0)
            .map(|entries| {
                entries.iter().filter(|entry| window.contains(entry.created_at)).cloned().collect()
            })
            .unwrap_or_default();
        entries.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(entries)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let guard = lock_or_recover(&self.entries);
        Ok(guard
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|entry| entry.created_at >= since)
            .count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: Mutex<HashMap<String, PricingRule>>,
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<PricingRule>, StoreError> {
        Ok(lock_or_recover(&self.rules).get(&id.0).cloned())
    }

    async fn find_by_ids(&self, ids: &[RuleId]) -> Result<Vec<PricingRule>, StoreError> {
        let guard = lock_or_recover(&self.rules);
        let mut rules: Vec<PricingRule> =
            ids.iter().filter_map(|id| guard.get(&id.0).cloned()).collect();
        sort_rules(&mut rules);
        rules.dedup_by(|left, right| left.id == right.id);
        Ok(rules)
    }

    async fn list(&self, only_active: bool) -> Result<Vec<PricingRule>, StoreError> {
        let guard = lock_or_recover(&self.rules);
        let mut rules: Vec<PricingRule> = guard
            .values()
            .filter(|rule| !only_active || rule.is_active)
            .cloned()
            .collect();
        sort_rules(&mut rules);
        Ok(rules)
    }

    async fn save(&self, rule: PricingRule) -> Result<(), StoreError> {
        lock_or_recover(&self.rules).insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn delete(&self, id: &RuleId) -> Result<bool, StoreError> {
        Ok(lock_or_recover(&self.rules).remove(&id.0).is_some())
    }

    async fn count_active(&self) -> Result<u64, StoreError> {
        Ok(lock_or_recover(&self.rules).values().filter(|rule| rule.is_active).count() as u64)
    }
}

fn sort_rules(rules: &mut [PricingRule]) {
    rules.sort_by(|left, right| {
        left.priority
            .cmp(&right.priority)
            .then_with(|| left.created_at.cmp(&right.created_at))
            .then_with(|| left.id.0.cmp(&right.id.0))
    });
}

#[derive(Default)]
pub struct InMemoryRecommendationStore {
    recommendations: Mutex<HashMap<String, Recommendation>>,
}

#[async_trait]
impl RecommendationStore for InMemoryRecommendationStore {
    async fn find_by_id(
        &self,
        id: &RecommendationId,
    ) -> Result<Option<Recommendation>, StoreError> {
        Ok(lock_or_recover(&self.recommendations).get(&id.0).cloned())
    }

    async fn insert(&self, recommendation: Recommendation) -> Result<(), StoreError> {
        lock_or_recover(&self.recommendations)
            .insert(recommendation.id.0.clone(), recommendation);
        Ok(())
    }

    async fn list(
        &self,
        filter: &RecommendationFilter,
        page: Page,
    ) -> Result<(Vec<Recommendation>, u64), StoreError> {
        let guard = lock_or_recover(&self.recommendations);
        let mut matching: Vec<Recommendation> = guard
            .values()
            .filter(|rec| {
                filter.status.as_ref().map_or(true, |status| &rec.status == status)
                    && filter.listing_id.as_ref().map_or(true, |listing| &rec.listing_id == listing)
            })
            .cloned()
            .collect();
        matching.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.0.cmp(&left.id.0))
        });

        let total = matching.len() as u64;
        let page = page.clamped();
        let items = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
        Ok((items, total))
    }

    async fn transition(
        &self,
        id: &RecommendationId,
        expected: RecommendationStatus,
        change: StatusChange,
    ) -> Result<bool, StoreError> {
        let mut guard = lock_or_recover(&self.recommendations);
        let Some(rec) = guard.get_mut(&id.0) else {
            return Ok(false);
        };
        if rec.status != expected {
            return Ok(false);
        }

        rec.status = change.next;
        if change.approved_by.is_some() {
            rec.approved_by = change.approved_by;
        }
        if change.rejected_reason.is_some() {
            rec.rejected_reason = change.rejected_reason;
        }
        rec.updated_at = change.updated_at;
        Ok(true)
    }

    async fn count_by_status_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(RecommendationStatus, u64)>, StoreError> {
        let guard = lock_or_recover(&self.recommendations);
        let mut counts = Vec::new();
        for status in [
            RecommendationStatus::Pending,
            RecommendationStatus::Approved,
            RecommendationStatus::Rejected,
            RecommendationStatus::Applied,
            RecommendationStatus::Expired,
        ] {
            let count = guard
                .values()
                .filter(|rec| rec.status == status && rec.created_at >= since)
                .count() as u64;
            if count > 0 {
                counts.push((status, count));
            }
        }
        Ok(counts)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut guard = lock_or_recover(&self.recommendations);
        let mut expired = 0;
        for rec in guard.values_mut() {
            if rec.status == RecommendationStatus::Pending && rec.expires_at < now {
                rec.status = RecommendationStatus::Expired;
                rec.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::listing::{Listing, ListingId, PriceHistoryPoint};
    use crate::domain::recommendation::{
        Recommendation, RecommendationId, RecommendationStatus,
    };
    use crate::domain::rule::{Action, PricingRule, RuleId};
    use crate::stores::{
        ListingStore, Page, PriceHistoryStore, RecommendationFilter, RecommendationStore,
        RuleStore, StatusChange, TimeWindow,
    };

    use super::{
        InMemoryListingStore, InMemoryPriceHistoryStore, InMemoryRecommendationStore,
        InMemoryRuleStore,
    };

    fn listing(id: &str) -> Listing {
        Listing {
            id: ListingId(id.to_string()),
            title: format!("listing {id}"),
            current_price: Decimal::new(10000, 2),
            cost_price: Decimal::new(7000, 2),
            competitor_price: None,
            sales_velocity: None,
            updated_at: Utc::now(),
        }
    }

    fn rule(id: &str, priority: i32, created_at: DateTime<Utc>) -> PricingRule {
        PricingRule {
            id: RuleId(id.to_string()),
            name: format!("rule {id}"),
            rule_type: "competitor_match".to_string(),
            conditions: Vec::new(),
            actions: vec![Action::AdjustPercent { value: Decimal::new(-3, 0) }],
            priority,
            is_active: true,
            created_at,
        }
    }

    fn recommendation(
        id: &str,
        listing_id: &str,
        status: RecommendationStatus,
        created_at: DateTime<Utc>,
    ) -> Recommendation {
        Recommendation {
            id: RecommendationId(id.to_string()),
            listing_id: ListingId(listing_id.to_string()),
            current_price: Decimal::new(10000, 2),
            recommended_price: Decimal::new(9700, 2),
            reason: "competitor undercut".to_string(),
            status,
            expires_at: created_at + Duration::hours(24),
            approved_by: None,
            rejected_reason: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn listing_round_trip_and_fetch_counter() {
        let store = InMemoryListingStore::default();
        store.insert(listing("lst-1"));

        let found = store
            .find_by_id(&ListingId("lst-1".to_string()))
            .await
            .expect("lookup should succeed")
            .expect("listing should exist");
        assert_eq!(found.title, "listing lst-1");

        let missing = store
            .find_by_id(&ListingId("lst-404".to_string()))
            .await
            .expect("lookup should succeed");
        assert!(missing.is_none());
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test]
    async fn rule_list_orders_by_priority_then_created_at() {
        let store = InMemoryRuleStore::default();
        let base = Utc::now();
        store.save(rule("rule-late", 5, base + Duration::minutes(10))).await.unwrap();
        store.save(rule("rule-early", 5, base)).await.unwrap();
        store.save(rule("rule-first", 1, base + Duration::hours(1))).await.unwrap();

        let mut inactive = rule("rule-off", 0, base);
        inactive.is_active = false;
        store.save(inactive).await.unwrap();

        let active = store.list(true).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|rule| rule.id.0.as_str()).collect();
        assert_eq!(ids, vec!["rule-first", "rule-early", "rule-late"]);

        let all = store.list(false).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(store.count_active().await.unwrap(), 3);

        assert!(store.delete(&RuleId("rule-late".to_string())).await.unwrap());
        assert!(!store.delete(&RuleId("rule-late".to_string())).await.unwrap());
    }

    #[tokio::test]
    async fn recommendation_list_filters_and_paginates_newest_first() {
        let store = InMemoryRecommendationStore::default();
        let base = Utc::now();
        for (id, listing_id, status, offset) in [
            ("rec-1", "lst-1", RecommendationStatus::Pending, 0),
            ("rec-2", "lst-1", RecommendationStatus::Approved, 1),
            ("rec-3", "lst-2", RecommendationStatus::Pending, 2),
            ("rec-4", "lst-1", RecommendationStatus::Pending, 3),
        ] {
            store
                .insert(recommendation(id, listing_id, status, base + Duration::minutes(offset)))
                .await
                .unwrap();
        }

        let filter = RecommendationFilter {
            status: Some(RecommendationStatus::Pending),
            listing_id: Some(ListingId("lst-1".to_string())),
        };
        let (items, total) = store.list(&filter, Page::default()).await.unwrap();
        assert_eq!(total, 2);
        let ids: Vec<&str> = items.iter().map(|rec| rec.id.0.as_str()).collect();
        assert_eq!(ids, vec!["rec-4", "rec-1"]);

        let (page, total) = store
            .list(&RecommendationFilter::default(), Page { limit: 2, offset: 2 })
            .await
            .unwrap();
        assert_eq!(total, 4);
        let ids: Vec<&str> = page.iter().map(|rec| rec.id.0.as_str()).collect();
        assert_eq!(ids, vec!["rec-2", "rec-1"]);
    }

    #[tokio::test]
    async fn transition_applies_only_on_expected_status() {
        let store = InMemoryRecommendationStore::default();
        let created = Utc::now();
        store
            .insert(recommendation("rec-1", "lst-1", RecommendationStatus::Pending, created))
            .await
            .unwrap();

        let id = RecommendationId("rec-1".to_string());
        let stale = store
            .transition(
                &id,
                RecommendationStatus::Approved,
                StatusChange {
                    next: RecommendationStatus::Applied,
                    approved_by: None,
                    rejected_reason: None,
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert!(!stale);

        let updated_at = created + Duration::minutes(5);
        let won = store
            .transition(
                &id,
                RecommendationStatus::Pending,
                StatusChange {
                    next: RecommendationStatus::Approved,
                    approved_by: Some("ops@example.com".to_string()),
                    rejected_reason: None,
                    updated_at,
                },
            )
            .await
            .unwrap();
        assert!(won);

        let rec = store.find_by_id(&id).await.unwrap().expect("row should exist");
        assert_eq!(rec.status, RecommendationStatus::Approved);
        assert_eq!(rec.approved_by.as_deref(), Some("ops@example.com"));
        assert_eq!(rec.updated_at, updated_at);

        let missing = store
            .transition(
                &RecommendationId("rec-404".to_string()),
                RecommendationStatus::Pending,
                StatusChange {
                    next: RecommendationStatus::Approved,
                    approved_by: None,
                    rejected_reason: None,
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn expire_overdue_flips_only_overdue_pending_rows() {
        let store = InMemoryRecommendationStore::default();
        let now = Utc::now();
        let overdue = recommendation(
            "rec-old",
            "lst-1",
            RecommendationStatus::Pending,
            now - Duration::hours(48),
        );
        let fresh = recommendation("rec-new", "lst-1", RecommendationStatus::Pending, now);
        let approved = recommendation(
            "rec-approved",
            "lst-1",
            RecommendationStatus::Approved,
            now - Duration::hours(48),
        );
        store.insert(overdue).await.unwrap();
        store.insert(fresh).await.unwrap();
        store.insert(approved).await.unwrap();

        let expired = store.expire_overdue(now).await.unwrap();
        assert_eq!(expired, 1);

        let rec = store
            .find_by_id(&RecommendationId("rec-old".to_string()))
            .await
            .unwrap()
            .expect("row should exist");
        assert_eq!(rec.status, RecommendationStatus::Expired);

        let counts = store.count_by_status_since(now - Duration::days(30)).await.unwrap();
        assert_eq!(
            counts,
            vec![
                (RecommendationStatus::Pending, 1),
                (RecommendationStatus::Approved, 1),
                (RecommendationStatus::Expired, 1),
            ]
        );
    }

    #[tokio::test]
    async fn history_window_is_filtered_and_ascending() {
        let store = InMemoryPriceHistoryStore::default();
        let now = Utc::now();
        let listing_id = ListingId("lst-1".to_string());
        for (price, days_ago) in [(9500i64, 3i64), (10000, 0), (9000, 10)] {
            store.record(PriceHistoryPoint {
                listing_id: listing_id.clone(),
                price: Decimal::new(price, 2),
                recorded_at: now - Duration::days(days_ago),
            });
        }

        let window =
            TimeWindow { start: Some(now - Duration::days(7)), end: Some(now + Duration::days(1)) };
        let points = store.history_for(&listing_id, &window).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].price, Decimal::new(9500, 2));
        assert_eq!(points[1].price, Decimal::new(10000, 2));
    }
}
