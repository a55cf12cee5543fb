use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use repricer_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Renders the effective configuration with per-field source attribution, so
/// an operator can see which layer (env, file, default) won each value.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: Vec<(&str, String, Option<&str>)> = vec![
        ("database.url", config.database.url.clone(), Some("REPRICER_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("REPRICER_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            Some("REPRICER_DATABASE_TIMEOUT_SECS"),
        ),
        (
            "safety.min_margin_percent",
            config.safety.min_margin_percent.to_string(),
            Some("REPRICER_SAFETY_MIN_MARGIN_PERCENT"),
        ),
        (
            "safety.max_step_percent",
            config.safety.max_step_percent.to_string(),
            Some("REPRICER_SAFETY_MAX_STEP_PERCENT"),
        ),
        (
            "engine.fetch_timeout_ms",
            config.engine.fetch_timeout_ms.to_string(),
            Some("REPRICER_ENGINE_FETCH_TIMEOUT_MS"),
        ),
        (
            "engine.fan_out_limit",
            config.engine.fan_out_limit.to_string(),
            Some("REPRICER_ENGINE_FAN_OUT_LIMIT"),
        ),
        (
            "engine.batch_limit",
            config.engine.batch_limit.to_string(),
            Some("REPRICER_ENGINE_BATCH_LIMIT"),
        ),
        (
            "engine.recommendation_ttl_hours",
            config.engine.recommendation_ttl_hours.to_string(),
            Some("REPRICER_ENGINE_RECOMMENDATION_TTL_HOURS"),
        ),
        (
            "engine.backtest_sample_size",
            config.engine.backtest_sample_size.to_string(),
            Some("REPRICER_ENGINE_BACKTEST_SAMPLE_SIZE"),
        ),
        ("logging.level", config.logging.level.clone(), Some("REPRICER_LOGGING_LEVEL")),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            Some("REPRICER_LOGGING_FORMAT"),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_var) in fields {
        let source = field_source(
            key,
            env_var,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("  {key} = {value}  ({source})")
}

fn field_source(
    key: &str,
    env_var: Option<&str>,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if let Some(name) = env_var {
        if env::var(name).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env:{name}");
        }
    }

    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_doc_has_key(doc, key) {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}

fn file_doc_has_key(doc: &Value, dotted_key: &str) -> bool {
    let mut current = doc;
    for part in dotted_key.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("repricer.toml"), PathBuf::from("config/repricer.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    toml::from_str::<Value>(&raw).ok()
}
