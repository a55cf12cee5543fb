use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub current_price: Decimal,
    pub cost_price: Decimal,
    pub competitor_price: Option<Decimal>,
    /// Recent sales velocity in units per week, when the catalog tracks it.
    pub sales_velocity: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    pub listing_id: ListingId,
    pub price: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceChangeLogEntry {
    pub listing_id: ListingId,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Everything rule evaluation may look at, assembled once per evaluation and
/// discarded afterwards. `as_of` is the evaluation clock so replays over
/// historical data stay deterministic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Facts {
    pub listing_id: ListingId,
    pub current_price: Decimal,
    pub cost_price: Decimal,
    pub competitor_price: Option<Decimal>,
    pub sales_velocity: Option<Decimal>,
    /// Ascending by `recorded_at`.
    pub history: Vec<PriceHistoryPoint>,
    pub as_of: DateTime<Utc>,
}

impl Facts {
    pub fn from_listing(
        listing: &Listing,
        mut history: Vec<PriceHistoryPoint>,
        as_of: DateTime<Utc>,
    ) -> Self {
        history.sort_by(|left, right| left.recorded_at.cmp(&right.recorded_at));
        Self {
            listing_id: listing.id.clone(),
            current_price: listing.current_price,
            cost_price: listing.cost_price,
            competitor_price: listing.competitor_price,
            sales_velocity: listing.sales_velocity,
            history,
            as_of,
        }
    }
}
