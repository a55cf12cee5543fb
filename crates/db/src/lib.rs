pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod stores;

pub use connection::{connect, connect_config, connect_with_settings, DbPool};
pub use fixtures::{
    DemoSeedDataset, SeedResult, VerificationResult, SEED_OVERDUE_RECOMMENDATION_ID,
};
pub use stores::{
    SqlChangeLogStore, SqlListingStore, SqlPriceHistoryStore, SqlRecommendationStore, SqlRuleStore,
};
