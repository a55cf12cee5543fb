pub mod backtest;
pub mod config;
pub mod doctor;
pub mod history;
pub mod migrate;
pub mod recs;
pub mod rules;
pub mod seed;
pub mod simulate;
pub mod stats;

use std::sync::Arc;

use repricer_core::audit::InMemoryAuditSink;
use repricer_core::backtester::{Backtester, BacktesterSettings};
use repricer_core::config::{AppConfig, LoadOptions};
use repricer_core::errors::ServiceError;
use repricer_core::rules::RuleCatalog;
use repricer_core::simulator::{Simulator, SimulatorSettings};
use repricer_core::workflow::RecommendationWorkflow;
use repricer_db::{
    connect_config, DbPool, SqlChangeLogStore, SqlListingStore, SqlPriceHistoryStore,
    SqlRecommendationStore, SqlRuleStore,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Value) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Exit code contract shared by every command: 2 configuration or invalid
/// input, 3 connectivity, 4 migration, 5 state or missing entity, 6 internal.
pub(crate) fn service_failure(command: &str, error: &ServiceError) -> CommandResult {
    let exit_code = match error {
        ServiceError::InvalidArgument(_) => 2,
        ServiceError::Unavailable(_) => 3,
        ServiceError::NotFound { .. }
        | ServiceError::InvalidState(_)
        | ServiceError::Expired { .. } => 5,
        ServiceError::Cancelled => 6,
    };
    CommandResult::failure(command, error.error_class(), error.to_string(), exit_code)
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            6,
        )
    })
}

pub(crate) async fn open_pool(command: &str, config: &AppConfig) -> Result<DbPool, CommandResult> {
    connect_config(&config.database).await.map_err(|error| {
        CommandResult::failure(
            command,
            "db_connectivity",
            format!("failed to connect to database: {error}"),
            3,
        )
    })
}

/// SQLite-backed store handles plus the services the commands drive. Audit
/// events land in an in-memory sink; the command process is short-lived and
/// the durable record is the database row the command mutates.
pub(crate) struct Services {
    pub listings: Arc<SqlListingStore>,
    pub history: Arc<SqlPriceHistoryStore>,
    pub changes: Arc<SqlChangeLogStore>,
    pub rules: Arc<SqlRuleStore>,
    pub recommendations: Arc<SqlRecommendationStore>,
    pub audit: Arc<InMemoryAuditSink>,
    pub config: AppConfig,
}

impl Services {
    pub fn new(pool: &DbPool, config: AppConfig) -> Self {
        Self {
            listings: Arc::new(SqlListingStore::new(pool.clone())),
            history: Arc::new(SqlPriceHistoryStore::new(pool.clone())),
            changes: Arc::new(SqlChangeLogStore::new(pool.clone())),
            rules: Arc::new(SqlRuleStore::new(pool.clone())),
            recommendations: Arc::new(SqlRecommendationStore::new(pool.clone())),
            audit: Arc::new(InMemoryAuditSink::default()),
            config,
        }
    }

    pub fn workflow(&self) -> RecommendationWorkflow {
        RecommendationWorkflow::new(
            self.recommendations.clone(),
            self.listings.clone(),
            self.changes.clone(),
            self.rules.clone(),
            self.audit.clone(),
            self.config.recommendation_ttl(),
        )
    }

    pub fn catalog(&self) -> RuleCatalog {
        RuleCatalog::new(self.rules.clone(), self.audit.clone())
    }

    pub fn simulator(&self) -> Simulator {
        Simulator::new(
            self.listings.clone(),
            self.history.clone(),
            self.rules.clone(),
            self.audit.clone(),
            SimulatorSettings {
                bounds: self.config.safety_bounds(),
                fan_out_limit: self.config.engine.fan_out_limit,
                batch_limit: self.config.engine.batch_limit,
                fetch_timeout: self.config.fetch_timeout(),
            },
        )
    }

    pub fn backtester(&self) -> Backtester {
        Backtester::new(
            self.listings.clone(),
            self.history.clone(),
            self.rules.clone(),
            self.audit.clone(),
            BacktesterSettings {
                bounds: self.config.safety_bounds(),
                fan_out_limit: self.config.engine.fan_out_limit,
                listing_limit: self.config.engine.batch_limit,
                fetch_timeout: self.config.fetch_timeout(),
                default_sample_size: self.config.engine.backtest_sample_size as usize,
            },
        )
    }
}

pub(crate) fn data_or_failure<T: Serialize>(
    command: &str,
    message: impl Into<String>,
    value: &T,
) -> CommandResult {
    match serde_json::to_value(value) {
        Ok(data) => CommandResult::success_with_data(command, message, data),
        Err(error) => CommandResult::failure(
            command,
            "serialization",
            format!("failed to encode command output: {error}"),
            6,
        ),
    }
}

#[cfg(test)]
mod tests {
    use repricer_core::errors::ServiceError;
    use serde_json::Value;

    use super::{service_failure, CommandResult};

    fn parse(output: &str) -> Value {
        serde_json::from_str(output).expect("command output should be JSON")
    }

    #[test]
    fn success_payload_carries_command_and_status() {
        let result = CommandResult::success("stats", "30 day summary");
        assert_eq!(result.exit_code, 0);

        let payload = parse(&result.output);
        assert_eq!(payload["command"], "stats");
        assert_eq!(payload["status"], "ok");
        assert!(payload.get("error_class").is_none());
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn data_payload_is_embedded_verbatim() {
        let result = CommandResult::success_with_data(
            "simulate",
            "1 listing evaluated",
            serde_json::json!({"proposed_price": "97"}),
        );

        let payload = parse(&result.output);
        assert_eq!(payload["data"]["proposed_price"], "97");
    }

    #[test]
    fn service_errors_map_to_exit_code_contract() {
        let invalid = service_failure("recs", &ServiceError::InvalidArgument("empty".into()));
        assert_eq!(invalid.exit_code, 2);
        assert_eq!(parse(&invalid.output)["error_class"], "invalid_argument");

        let missing = service_failure(
            "recs",
            &ServiceError::NotFound { entity: "recommendation", id: "rec-404".into() },
        );
        assert_eq!(missing.exit_code, 5);

        let unavailable = service_failure("recs", &ServiceError::Unavailable("pool".into()));
        assert_eq!(unavailable.exit_code, 3);

        let cancelled = service_failure("backtest", &ServiceError::Cancelled);
        assert_eq!(cancelled.exit_code, 6);
    }
}
