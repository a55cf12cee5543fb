use std::env;
use std::sync::{Mutex, OnceLock};

use repricer_cli::commands::{migrate, seed, simulate, stats};
use serde_json::Value;

#[test]
fn migrate_succeeds_against_in_memory_database() {
    with_env(
        &[
            ("REPRICER_DATABASE_URL", "sqlite::memory:"),
            ("REPRICER_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_migrates_loads_and_verifies_demo_fixtures() {
    with_env(
        &[
            ("REPRICER_DATABASE_URL", "sqlite::memory:"),
            ("REPRICER_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(
            message.contains("3 listings") && message.contains("4 rules"),
            "unexpected seed summary: {message}"
        );
    });
}

#[test]
fn migrate_reports_config_failure_for_malformed_override() {
    with_env(&[("REPRICER_DATABASE_MAX_CONNECTIONS", "a-lot")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn oversized_simulate_batch_fails_before_touching_the_store() {
    with_env(
        &[
            ("REPRICER_DATABASE_URL", "sqlite::memory:"),
            ("REPRICER_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
        // 101 ids against an unmigrated database: the cap check must fire
        // before any query, so the missing schema never surfaces.
        let args = simulate::SimulateArgs {
            listing_ids: (0..101).map(|index| format!("lst-{index:03}")).collect(),
            rule_ids: Vec::new(),
            min_margin: None,
            max_step: None,
        };

        let result = simulate::run(args);
        assert_eq!(result.exit_code, 2, "expected invalid argument: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_argument");
        assert!(
            payload["message"].as_str().unwrap_or("").contains("Maximum 100 listings per batch"),
            "unexpected message: {}",
            payload["message"]
        );
    });
}

#[test]
fn stats_against_unmigrated_database_is_unavailable() {
    with_env(
        &[
            ("REPRICER_DATABASE_URL", "sqlite::memory:"),
            ("REPRICER_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
        let result = stats::run(30);
        assert_eq!(result.exit_code, 3, "expected retryable store failure: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "unavailable");
    });
}

#[test]
fn stats_rejects_non_positive_window() {
    with_env(
        &[
            ("REPRICER_DATABASE_URL", "sqlite::memory:"),
            ("REPRICER_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
        let result = stats::run(0);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const MANAGED_VARS: &[&str] = &[
    "REPRICER_DATABASE_URL",
    "REPRICER_DATABASE_MAX_CONNECTIONS",
    "REPRICER_DATABASE_TIMEOUT_SECS",
    "REPRICER_SAFETY_MIN_MARGIN_PERCENT",
    "REPRICER_SAFETY_MAX_STEP_PERCENT",
    "REPRICER_ENGINE_BATCH_LIMIT",
    "REPRICER_LOGGING_LEVEL",
];

fn with_env(vars: &[(&str, &str)], test: impl FnOnce()) {
    let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let saved: Vec<(String, Option<String>)> =
        MANAGED_VARS.iter().map(|name| (name.to_string(), env::var(name).ok())).collect();

    for name in MANAGED_VARS {
        env::remove_var(name);
    }
    for (name, value) in vars {
        env::set_var(name, value);
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test));

    for (name, value) in saved {
        match value {
            Some(value) => env::set_var(&name, value),
            None => env::remove_var(&name),
        }
    }

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}
