use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::listing::{Listing, ListingId, PriceChangeLogEntry, PriceHistoryPoint};
use crate::domain::recommendation::{Recommendation, RecommendationId, RecommendationStatus};
use crate::domain::rule::{PricingRule, RuleId};
use crate::errors::ServiceError;

pub mod memory;

pub use memory::{
    InMemoryChangeLogStore, InMemoryListingStore, InMemoryPriceHistoryStore,
    InMemoryRecommendationStore, InMemoryRuleStore,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        ServiceError::Unavailable(value.to_string())
    }
}

/// Inclusive-start, exclusive-end time window; `None` bounds are open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if at >= end {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

impl Page {
    /// List endpoints never return more than 100 rows per page.
    pub fn clamped(self) -> Self {
        Self { limit: self.limit.clamp(1, 100), offset: self.offset }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecommendationFilter {
    pub status: Option<RecommendationStatus>,
    pub listing_id: Option<ListingId>,
}

/// Mutation half of the status compare-and-set. `None` payload fields keep
/// the stored value.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub next: RecommendationStatus,
    pub approved_by: Option<String>,
    pub rejected_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, StoreError>;

    /// Stable id-ordered sample of the catalog, used when a caller does not
    /// name listings explicitly.
    async fn list_ids(&self, limit: u32) -> Result<Vec<ListingId>, StoreError>;
}

#[async_trait]
pub trait PriceHistoryStore: Send + Sync {
    /// Points inside the window, ascending by `recorded_at`.
    async fn history_for(
        &self,
        listing_id: &ListingId,
        window: &TimeWindow,
    ) -> Result<Vec<PriceHistoryPoint>, StoreError>;
}

#[async_trait]
pub trait ChangeLogStore: Send + Sync {
    async fn changes_for(
        &self,
        listing_id: &ListingId,
        window: &TimeWindow,
    ) -> Result<Vec<PriceChangeLogEntry>, StoreError>;

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<PricingRule>, StoreError>;
    async fn find_by_ids(&self, ids: &[RuleId]) -> Result<Vec<PricingRule>, StoreError>;
    async fn list(&self, only_active: bool) -> Result<Vec<PricingRule>, StoreError>;
    async fn save(&self, rule: PricingRule) -> Result<(), StoreError>;
    async fn delete(&self, id: &RuleId) -> Result<bool, StoreError>;
    async fn count_active(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn find_by_id(
        &self,
        id: &RecommendationId,
    ) -> Result<Option<Recommendation>, StoreError>;

    async fn insert(&self, recommendation: Recommendation) -> Result<(), StoreError>;

    /// Newest first; returns the page plus the total row count for the
    /// filter.
    async fn list(
        &self,
        filter: &RecommendationFilter,
        page: Page,
    ) -> Result<(Vec<Recommendation>, u64), StoreError>;

    /// Atomically applies `change` iff the stored status equals `expected`.
    /// Returns whether a row transitioned; under concurrent callers exactly
    /// one observes `true`.
    async fn transition(
        &self,
        id: &RecommendationId,
        expected: RecommendationStatus,
        change: StatusChange,
    ) -> Result<bool, StoreError>;

    async fn count_by_status_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(RecommendationStatus, u64)>, StoreError>;

    /// Flips overdue `Pending` rows to `Expired`; returns how many changed.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Page, TimeWindow};

    #[test]
    fn page_clamps_limit_into_contract_range() {
        assert_eq!(Page { limit: 500, offset: 0 }.clamped().limit, 100);
        assert_eq!(Page { limit: 0, offset: 10 }.clamped().limit, 1);
        assert_eq!(Page { limit: 25, offset: 10 }.clamped().limit, 25);
    }

    #[test]
    fn window_bounds_are_start_inclusive_end_exclusive() {
        let now = Utc::now();
        let window = TimeWindow { start: Some(now - Duration::days(7)), end: Some(now) };

        assert!(window.contains(now - Duration::days(7)));
        assert!(window.contains(now - Duration::seconds(1)));
        assert!(!window.contains(now));
        assert!(!window.contains(now - Duration::days(8)));
    }

    #[test]
    fn open_window_contains_everything() {
        assert!(TimeWindow::default().contains(Utc::now()));
    }
}
