use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::safety::SafetyBounds;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub safety: SafetyConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SafetyConfig {
    pub min_margin_percent: Decimal,
    pub max_step_percent: Decimal,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub fetch_timeout_ms: u64,
    pub fan_out_limit: u32,
    pub batch_limit: u32,
    pub recommendation_ttl_hours: u64,
    pub backtest_sample_size: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://repricer.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            safety: SafetyConfig {
                min_margin_percent: Decimal::new(10, 0),
                max_step_percent: Decimal::new(20, 0),
            },
            engine: EngineConfig {
                fetch_timeout_ms: 5_000,
                fan_out_limit: 8,
                batch_limit: 100,
                recommendation_ttl_hours: 24,
                backtest_sample_size: 50,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("repricer.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Guard bounds as the engine consumes them.
    pub fn safety_bounds(&self) -> SafetyBounds {
        SafetyBounds {
            min_margin_percent: self.safety.min_margin_percent,
            max_step_percent: self.safety.max_step_percent,
        }
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.engine.fetch_timeout_ms)
    }

    pub fn recommendation_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.engine.recommendation_ttl_hours as i64)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(safety) = patch.safety {
            if let Some(min_margin_percent) = safety.min_margin_percent {
                self.safety.min_margin_percent = min_margin_percent;
            }
            if let Some(max_step_percent) = safety.max_step_percent {
                self.safety.max_step_percent = max_step_percent;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(fetch_timeout_ms) = engine.fetch_timeout_ms {
                self.engine.fetch_timeout_ms = fetch_timeout_ms;
            }
            if let Some(fan_out_limit) = engine.fan_out_limit {
                self.engine.fan_out_limit = fan_out_limit;
            }
            if let Some(batch_limit) = engine.batch_limit {
                self.engine.batch_limit = batch_limit;
            }
            if let Some(recommendation_ttl_hours) = engine.recommendation_ttl_hours {
                self.engine.recommendation_ttl_hours = recommendation_ttl_hours;
            }
            if let Some(backtest_sample_size) = engine.backtest_sample_size {
                self.engine.backtest_sample_size = backtest_sample_size;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REPRICER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REPRICER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("REPRICER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REPRICER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REPRICER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPRICER_SAFETY_MIN_MARGIN_PERCENT") {
            self.safety.min_margin_percent =
                parse_decimal("REPRICER_SAFETY_MIN_MARGIN_PERCENT", &value)?;
        }
        if let Some(value) = read_env("REPRICER_SAFETY_MAX_STEP_PERCENT") {
            self.safety.max_step_percent =
                parse_decimal("REPRICER_SAFETY_MAX_STEP_PERCENT", &value)?;
        }

        if let Some(value) = read_env("REPRICER_ENGINE_FETCH_TIMEOUT_MS") {
            self.engine.fetch_timeout_ms = parse_u64("REPRICER_ENGINE_FETCH_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("REPRICER_ENGINE_FAN_OUT_LIMIT") {
            self.engine.fan_out_limit = parse_u32("REPRICER_ENGINE_FAN_OUT_LIMIT", &value)?;
        }
        if let Some(value) = read_env("REPRICER_ENGINE_BATCH_LIMIT") {
            self.engine.batch_limit = parse_u32("REPRICER_ENGINE_BATCH_LIMIT", &value)?;
        }
        if let Some(value) = read_env("REPRICER_ENGINE_RECOMMENDATION_TTL_HOURS") {
            self.engine.recommendation_ttl_hours =
                parse_u64("REPRICER_ENGINE_RECOMMENDATION_TTL_HOURS", &value)?;
        }
        if let Some(value) = read_env("REPRICER_ENGINE_BACKTEST_SAMPLE_SIZE") {
            self.engine.backtest_sample_size =
                parse_u32("REPRICER_ENGINE_BACKTEST_SAMPLE_SIZE", &value)?;
        }

        let log_level =
            read_env("REPRICER_LOGGING_LEVEL").or_else(|| read_env("REPRICER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REPRICER_LOGGING_FORMAT").or_else(|| read_env("REPRICER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_safety(&self.safety)?;
        validate_engine(&self.engine)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("repricer.toml"), PathBuf::from("config/repricer.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_safety(safety: &SafetyConfig) -> Result<(), ConfigError> {
    if safety.min_margin_percent < Decimal::ZERO
        || safety.min_margin_percent >= Decimal::ONE_HUNDRED
    {
        return Err(ConfigError::Validation(
            "safety.min_margin_percent must be in range 0..100".to_string(),
        ));
    }

    if safety.max_step_percent <= Decimal::ZERO || safety.max_step_percent > Decimal::ONE_HUNDRED {
        return Err(ConfigError::Validation(
            "safety.max_step_percent must be in range (0, 100]".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.fetch_timeout_ms == 0 || engine.fetch_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "engine.fetch_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    if engine.fan_out_limit == 0 || engine.fan_out_limit > 64 {
        return Err(ConfigError::Validation(
            "engine.fan_out_limit must be in range 1..=64".to_string(),
        ));
    }

    if engine.batch_limit == 0 || engine.batch_limit > 100 {
        return Err(ConfigError::Validation(
            "engine.batch_limit must be in range 1..=100".to_string(),
        ));
    }

    if engine.recommendation_ttl_hours == 0 || engine.recommendation_ttl_hours > 720 {
        return Err(ConfigError::Validation(
            "engine.recommendation_ttl_hours must be in range 1..=720".to_string(),
        ));
    }

    if engine.backtest_sample_size == 0 || engine.backtest_sample_size > 10_000 {
        return Err(ConfigError::Validation(
            "engine.backtest_sample_size must be in range 1..=10000".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    safety: Option<SafetyPatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SafetyPatch {
    min_margin_percent: Option<Decimal>,
    max_step_percent: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    fetch_timeout_ms: Option<u64>,
    fan_out_limit: Option<u32>,
    batch_limit: Option<u32>,
    recommendation_ttl_hours: Option<u64>,
    backtest_sample_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
