use repricer_core::domain::rule::{Action, Condition};
use repricer_core::stores::StoreError;
use sqlx::Executor;

use crate::stores::backend;
use crate::DbPool;

/// Canonical demo seed contract: three listings with history, one rule per
/// shipped condition family, and recommendations in the states the review
/// commands act on.
const SEED_LISTINGS: &[SeedListingContract] = &[
    SeedListingContract {
        listing_id: "lst-dock-27",
        title: "Anker 7-in-1 USB-C Dock",
        history_points: 5,
        change_entries: 2,
    },
    SeedListingContract {
        listing_id: "lst-lamp-09",
        title: "Ring Light Desk Lamp",
        history_points: 3,
        change_entries: 2,
    },
    SeedListingContract {
        listing_id: "lst-chair-41",
        title: "Ergonomic Mesh Office Chair",
        history_points: 2,
        change_entries: 0,
    },
];

const SEED_RULE_IDS: &[&str] =
    &["rule-competitor-match", "rule-margin-floor", "rule-stale-markdown", "rule-holiday-floor"];

const SEED_ACTIVE_RULE_COUNT: i64 = 3;

const SEED_RECOMMENDATIONS: &[(&str, &str)] =
    &[("rec-demo-0001", "PENDING"), ("rec-demo-0002", "APPROVED"), ("rec-demo-0003", "PENDING")];

/// The one pending seed row already past its expiry, for expiry-sweep demos.
pub const SEED_OVERDUE_RECOMMENDATION_ID: &str = "rec-demo-0003";

struct SeedListingContract {
    listing_id: &'static str,
    title: &'static str,
    history_points: i64,
    change_entries: i64,
}

/// Deterministic demo fixtures for a freshly migrated database.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo seed.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Load the demo seed into the database. One transaction; a partial seed
    /// never becomes visible.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        let mut tx = pool.begin().await.map_err(backend)?;
        tx.execute(sqlx::query(Self::SQL)).await.map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        Ok(SeedResult {
            listings: SEED_LISTINGS.iter().map(|listing| listing.listing_id).collect(),
            rules: SEED_RULE_IDS.to_vec(),
            recommendations: SEED_RECOMMENDATIONS.iter().map(|(id, _)| *id).collect(),
        })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, StoreError> {
        let mut checks = Vec::new();

        for listing in SEED_LISTINGS {
            let listing_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM listings WHERE id = ? AND title = ?)",
            )
            .bind(listing.listing_id)
            .bind(listing.title)
            .fetch_one(pool)
            .await
            .map_err(backend)?;
            checks.push((format!("{}-listing", listing.listing_id), listing_ok == 1));

            let history_count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM price_history WHERE listing_id = ?")
                    .bind(listing.listing_id)
                    .fetch_one(pool)
                    .await
                    .map_err(backend)?;
            checks.push((
                format!("{}-history", listing.listing_id),
                history_count == listing.history_points,
            ));

            let change_count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM price_change_log WHERE listing_id = ?")
                    .bind(listing.listing_id)
                    .fetch_one(pool)
                    .await
                    .map_err(backend)?;
            checks.push((
                format!("{}-changes", listing.listing_id),
                change_count == listing.change_entries,
            ));
        }

        for rule_id in SEED_RULE_IDS {
            let payloads: Option<(String, String)> =
                sqlx::query_as("SELECT conditions, actions FROM pricing_rules WHERE id = ?")
                    .bind(rule_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(backend)?;

            let decodes = payloads.as_ref().is_some_and(|(conditions, actions)| {
                serde_json::from_str::<Vec<Condition>>(conditions).is_ok()
                    && serde_json::from_str::<Vec<Action>>(actions).is_ok()
            });
            checks.push((format!("{rule_id}-payloads"), decodes));
        }

        let active_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pricing_rules WHERE is_active = 1")
                .fetch_one(pool)
                .await
                .map_err(backend)?;
        checks.push(("active-rule-count".to_string(), active_count == SEED_ACTIVE_RULE_COUNT));

        for (recommendation_id, status) in SEED_RECOMMENDATIONS {
            let recommendation_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM recommendations WHERE id = ? AND status = ?)",
            )
            .bind(recommendation_id)
            .bind(status)
            .fetch_one(pool)
            .await
            .map_err(backend)?;
            checks.push((format!("{recommendation_id}-status"), recommendation_ok == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub listings: Vec<&'static str>,
    pub rules: Vec<&'static str>,
    pub recommendations: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
