//! Read-side stores over the catalog tables. Listings, their price history,
//! and the applied-change log are written by the ingest pipeline; the Rust
//! side only evaluates against them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use repricer_core::domain::listing::{Listing, ListingId, PriceChangeLogEntry, PriceHistoryPoint};
use repricer_core::stores::{
    ChangeLogStore, ListingStore, PriceHistoryStore, StoreError, TimeWindow,
};

use super::{
    backend, column, non_negative_count, parse_decimal, parse_optional_decimal, parse_timestamp,
    window_bounds,
};
use crate::DbPool;

pub struct SqlListingStore {
    pool: DbPool,
}

impl SqlListingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingStore for SqlListingStore {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, current_price, cost_price, competitor_price, sales_velocity, updated_at
            FROM listings
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(listing_from_row).transpose()
    }

    async fn list_ids(&self, limit: u32) -> Result<Vec<ListingId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM listings ORDER BY id ASC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(|row| Ok(ListingId(column(row, "id")?))).collect()
    }
}

pub struct SqlPriceHistoryStore {
    pool: DbPool,
}

impl SqlPriceHistoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceHistoryStore for SqlPriceHistoryStore {
    async fn history_for(
        &self,
        listing_id: &ListingId,
        window: &TimeWindow,
    ) -> Result<Vec<PriceHistoryPoint>, StoreError> {
        let (start, end) = window_bounds(window);
        let rows = sqlx::query(
            r#"
            SELECT listing_id, price, recorded_at
            FROM price_history
            WHERE listing_id = ?
              AND (? IS NULL OR recorded_at >= ?)
              AND (? IS NULL OR recorded_at < ?)
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(&listing_id.0)
        .bind(start.as_deref())
        .bind(start.as_deref())
        .bind(end.as_deref())
        .bind(end.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(history_point_from_row).collect()
    }
}

pub struct SqlChangeLogStore {
    pool: DbPool,
}

impl SqlChangeLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeLogStore for SqlChangeLogStore {
    async fn changes_for(
        &self,
        listing_id: &ListingId,
        window: &TimeWindow,
    ) -> Result<Vec<PriceChangeLogEntry>, StoreError> {
        let (start, end) = window_bounds(window);
        let rows = sqlx::query(
            r#"
            SELECT listing_id, old_price, new_price, created_at
            FROM price_change_log
            WHERE listing_id = ?
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at < ?)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&listing_id.0)
        .bind(start.as_deref())
        .bind(start.as_deref())
        .bind(end.as_deref())
        .bind(end.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(change_entry_from_row).collect()
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM price_change_log WHERE created_at >= ?")
                .bind(since.to_rfc3339())
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;

        Ok(non_negative_count(count))
    }
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing, StoreError> {
    Ok(Listing {
        id: ListingId(column(row, "id")?),
        title: column(row, "title")?,
        current_price: parse_decimal("current_price", column(row, "current_price")?)?,
        cost_price: parse_decimal("cost_price", column(row, "cost_price")?)?,
        competitor_price: parse_optional_decimal(
            "competitor_price",
            column(row, "competitor_price")?,
        )?,
        sales_velocity: parse_optional_decimal("sales_velocity", column(row, "sales_velocity")?)?,
        updated_at: parse_timestamp("updated_at", column(row, "updated_at")?)?,
    })
}

fn history_point_from_row(row: &SqliteRow) -> Result<PriceHistoryPoint, StoreError> {
    Ok(PriceHistoryPoint {
        listing_id: ListingId(column(row, "listing_id")?),
        price: parse_decimal("price", column(row, "price")?)?,
        recorded_at: parse_timestamp("recorded_at", column(row, "recorded_at")?)?,
    })
}

fn change_entry_from_row(row: &SqliteRow) -> Result<PriceChangeLogEntry, StoreError> {
    Ok(PriceChangeLogEntry {
        listing_id: ListingId(column(row, "listing_id")?),
        old_price: parse_decimal("old_price", column(row, "old_price")?)?,
        new_price: parse_decimal("new_price", column(row, "new_price")?)?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
    })
}
