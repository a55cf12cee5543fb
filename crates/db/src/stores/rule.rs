use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use repricer_core::domain::rule::{PricingRule, RuleId};
use repricer_core::stores::{RuleStore, StoreError};

use super::{backend, column, non_negative_count, parse_bool_flag, parse_timestamp};
use crate::DbPool;

/// Catalog order: priority ascending, then creation time, then id.
const RULE_COLUMNS: &str =
    "id, name, rule_type, conditions, actions, priority, is_active, created_at";
const RULE_ORDER: &str = "priority ASC, created_at ASC, id ASC";

pub struct SqlRuleStore {
    pool: DbPool,
}

impl SqlRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for SqlRuleStore {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<PricingRule>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM pricing_rules WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(rule_from_row).transpose()
    }

    async fn find_by_ids(&self, ids: &[RuleId]) -> Result<Vec<PricingRule>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM pricing_rules WHERE id IN ({placeholders}) ORDER BY {RULE_ORDER}"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(&id.0);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(backend)?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn list(&self, only_active: bool) -> Result<Vec<PricingRule>, StoreError> {
        let rows = if only_active {
            sqlx::query(&format!(
                "SELECT {RULE_COLUMNS} FROM pricing_rules WHERE is_active = 1 ORDER BY {RULE_ORDER}"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        } else {
            sqlx::query(&format!(
                "SELECT {RULE_COLUMNS} FROM pricing_rules ORDER BY {RULE_ORDER}"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        };

        rows.iter().map(rule_from_row).collect()
    }

    async fn save(&self, rule: PricingRule) -> Result<(), StoreError> {
        let conditions = encode_json("conditions", &rule.conditions)?;
        let actions = encode_json("actions", &rule.actions)?;

        sqlx::query(
            r#"
            INSERT INTO pricing_rules (
                id, name, rule_type, conditions, actions, priority, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                rule_type = excluded.rule_type,
                conditions = excluded.conditions,
                actions = excluded.actions,
                priority = excluded.priority,
                is_active = excluded.is_active
            "#,
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(&rule.rule_type)
        .bind(conditions)
        .bind(actions)
        .bind(i64::from(rule.priority))
        .bind(if rule.is_active { 1_i64 } else { 0_i64 })
        .bind(rule.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn delete(&self, id: &RuleId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pricing_rules WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_active(&self) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pricing_rules WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;

        Ok(non_negative_count(count))
    }
}

fn encode_json<T: serde::Serialize>(field: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|error| StoreError::Decode(format!("invalid {field} payload: {error}")))
}

fn rule_from_row(row: &SqliteRow) -> Result<PricingRule, StoreError> {
    let conditions_raw: String = column(row, "conditions")?;
    let actions_raw: String = column(row, "actions")?;
    let priority: i64 = column(row, "priority")?;

    Ok(PricingRule {
        id: RuleId(column(row, "id")?),
        name: column(row, "name")?,
        rule_type: column(row, "rule_type")?,
        conditions: decode_json("conditions", &conditions_raw)?,
        actions: decode_json("actions", &actions_raw)?,
        priority: i32::try_from(priority).map_err(|_| {
            StoreError::Decode(format!("invalid value for `priority` (expected i32): {priority}"))
        })?,
        is_active: parse_bool_flag("is_active", column(row, "is_active")?)?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(field: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw)
        .map_err(|error| StoreError::Decode(format!("invalid {field} JSON: {error}")))
}
