//! SQLite-backed implementations of the core store traits.
//!
//! Prices travel as decimal strings and timestamps as RFC 3339 UTC strings,
//! so anything that fails to parse on the way out surfaces as a decode error
//! instead of a silently wrong value.

use chrono::{DateTime, Utc};
use repricer_core::stores::{StoreError, TimeWindow};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub mod listing;
pub mod recommendation;
pub mod rule;

pub use listing::{SqlChangeLogStore, SqlListingStore, SqlPriceHistoryStore};
pub use recommendation::SqlRecommendationStore;
pub use rule::SqlRuleStore;

pub(crate) fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|error| StoreError::Decode(format!("column `{name}`: {error}")))
}

/// RFC 3339 bounds for the `(? IS NULL OR col >= ?)` window clause.
pub(crate) fn window_bounds(window: &TimeWindow) -> (Option<String>, Option<String>) {
    (window.start.map(|at| at.to_rfc3339()), window.end.map(|at| at.to_rfc3339()))
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| StoreError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})")),
    )
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, StoreError> {
    value.parse::<Decimal>().map_err(|error| {
        StoreError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, StoreError> {
    value.map(|raw| parse_decimal(column, raw)).transpose()
}

pub(crate) fn parse_bool_flag(column: &str, value: i64) -> Result<bool, StoreError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        raw => Err(StoreError::Decode(format!("invalid boolean flag for `{column}`: {raw}"))),
    }
}

pub(crate) fn non_negative_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}
