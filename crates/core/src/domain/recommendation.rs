use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::listing::ListingId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecommendationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    Expired,
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Applied => "APPLIED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(label)
    }
}

/// A persisted price proposal awaiting operator review.
///
/// Expiry is enforced lazily at the approval boundary: an overdue row keeps
/// `Pending` at rest until someone touches it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub listing_id: ListingId,
    pub current_price: Decimal,
    pub recommended_price: Decimal,
    pub reason: String,
    pub status: RecommendationStatus,
    pub expires_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub rejected_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn can_transition_to(&self, next: RecommendationStatus) -> bool {
        matches!(
            (&self.status, next),
            (RecommendationStatus::Pending, RecommendationStatus::Approved)
                | (RecommendationStatus::Pending, RecommendationStatus::Rejected)
                | (RecommendationStatus::Pending, RecommendationStatus::Expired)
                | (RecommendationStatus::Approved, RecommendationStatus::Applied)
        )
    }

    pub fn transition_to(&mut self, next: RecommendationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next.clone()) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidRecommendationTransition { from: self.status.clone(), to: next })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Relative change implied by the recommendation, in percent.
    pub fn change_percent(&self) -> Decimal {
        change_percent(self.current_price, self.recommended_price)
    }
}

pub fn change_percent(current: Decimal, proposed: Decimal) -> Decimal {
    if current.is_zero() {
        return Decimal::ZERO;
    }
    (proposed - current) / current * Decimal::ONE_HUNDRED
}
