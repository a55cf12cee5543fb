use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use repricer_core::domain::listing::ListingId;
use repricer_core::domain::recommendation::{
    Recommendation, RecommendationId, RecommendationStatus,
};
use repricer_core::stores::{Page, RecommendationFilter, RecommendationStore, StatusChange, StoreError};

use super::{backend, column, non_negative_count, parse_decimal, parse_timestamp};
use crate::DbPool;

const RECOMMENDATION_COLUMNS: &str = "id, listing_id, current_price, recommended_price, reason, \
                                      status, expires_at, approved_by, rejected_reason, \
                                      created_at, updated_at";

pub struct SqlRecommendationStore {
    pool: DbPool,
}

impl SqlRecommendationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecommendationStore for SqlRecommendationStore {
    async fn find_by_id(
        &self,
        id: &RecommendationId,
    ) -> Result<Option<Recommendation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(recommendation_from_row).transpose()
    }

    async fn insert(&self, recommendation: Recommendation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO recommendations (
                id, listing_id, current_price, recommended_price, reason,
                status, expires_at, approved_by, rejected_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&recommendation.id.0)
        .bind(&recommendation.listing_id.0)
        .bind(recommendation.current_price.to_string())
        .bind(recommendation.recommended_price.to_string())
        .bind(&recommendation.reason)
        .bind(status_to_str(&recommendation.status))
        .bind(recommendation.expires_at.to_rfc3339())
        .bind(recommendation.approved_by.as_deref())
        .bind(recommendation.rejected_reason.as_deref())
        .bind(recommendation.created_at.to_rfc3339())
        .bind(recommendation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn list(
        &self,
        filter: &RecommendationFilter,
        page: Page,
    ) -> Result<(Vec<Recommendation>, u64), StoreError> {
        let page = page.clamped();
        let status = filter.status.as_ref().map(status_to_str);
        let listing_id = filter.listing_id.as_ref().map(|id| id.0.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM recommendations
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR listing_id = ?)
            "#,
        )
        .bind(status)
        .bind(status)
        .bind(listing_id)
        .bind(listing_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {RECOMMENDATION_COLUMNS}
            FROM recommendations
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR listing_id = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(status)
        .bind(status)
        .bind(listing_id)
        .bind(listing_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let items: Result<Vec<Recommendation>, StoreError> =
            rows.iter().map(recommendation_from_row).collect();
        Ok((items?, non_negative_count(total)))
    }

    /// Compare-and-set: the row moves only if it still has the expected
    /// status, so concurrent reviewers cannot both win.
    async fn transition(
        &self,
        id: &RecommendationId,
        expected: RecommendationStatus,
        change: StatusChange,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE recommendations
            SET status = ?,
                approved_by = COALESCE(?, approved_by),
                rejected_reason = COALESCE(?, rejected_reason),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status_to_str(&change.next))
        .bind(change.approved_by.as_deref())
        .bind(change.rejected_reason.as_deref())
        .bind(change.updated_at.to_rfc3339())
        .bind(&id.0)
        .bind(status_to_str(&expected))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_by_status_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(RecommendationStatus, u64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM recommendations
            WHERE created_at >= ?
            GROUP BY status
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut counts: Vec<(RecommendationStatus, u64)> = rows
            .iter()
            .map(|row| {
                let raw: String = column(row, "status")?;
                let count: i64 = column(row, "count")?;
                Ok((parse_status("status", &raw)?, non_negative_count(count)))
            })
            .collect::<Result<_, StoreError>>()?;
        counts.sort_by_key(|(status, _)| status_rank(status));

        Ok(counts)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE recommendations
            SET status = 'EXPIRED', updated_at = ?
            WHERE status = 'PENDING' AND expires_at < ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }
}

fn status_to_str(status: &RecommendationStatus) -> &'static str {
    match status {
        RecommendationStatus::Pending => "PENDING",
        RecommendationStatus::Approved => "APPROVED",
        RecommendationStatus::Rejected => "REJECTED",
        RecommendationStatus::Applied => "APPLIED",
        RecommendationStatus::Expired => "EXPIRED",
    }
}

fn parse_status(column: &str, value: &str) -> Result<RecommendationStatus, StoreError> {
    match value {
        "PENDING" => Ok(RecommendationStatus::Pending),
        "APPROVED" => Ok(RecommendationStatus::Approved),
        "REJECTED" => Ok(RecommendationStatus::Rejected),
        "APPLIED" => Ok(RecommendationStatus::Applied),
        "EXPIRED" => Ok(RecommendationStatus::Expired),
        raw => Err(StoreError::Decode(format!(
            "invalid recommendation status in `{column}`: {raw}"
        ))),
    }
}

fn status_rank(status: &RecommendationStatus) -> u8 {
    match status {
        RecommendationStatus::Pending => 0,
        RecommendationStatus::Approved => 1,
        RecommendationStatus::Rejected => 2,
        RecommendationStatus::Applied => 3,
        RecommendationStatus::Expired => 4,
    }
}

fn recommendation_from_row(row: &SqliteRow) -> Result<Recommendation, StoreError> {
    let status_raw: String = column(row, "status")?;

    Ok(Recommendation {
        id: RecommendationId(column(row, "id")?),
        listing_id: ListingId(column(row, "listing_id")?),
        current_price: parse_decimal("current_price", column(row, "current_price")?)?,
        recommended_price: parse_decimal(
            "recommended_price",
            column(row, "recommended_price")?,
        )?,
        reason: column(row, "reason")?,
        status: parse_status("status", &status_raw)?,
        expires_at: parse_timestamp("expires_at", column(row, "expires_at")?)?,
        approved_by: column(row, "approved_by")?,
        rejected_reason: column(row, "rejected_reason")?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", column(row, "updated_at")?)?,
    })
}
