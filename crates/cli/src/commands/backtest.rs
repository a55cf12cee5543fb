use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use repricer_core::backtester::BacktestRequest;
use repricer_core::domain::listing::ListingId;
use repricer_core::domain::rule::RuleId;
use repricer_core::engine::SafetyOverrides;
use rust_decimal::Decimal;

use crate::commands::{
    build_runtime, data_or_failure, load_config, open_pool, service_failure, CommandResult,
    Services,
};

#[derive(Debug, Args)]
pub struct BacktestArgs {
    /// Rule ids to replay. Each rule is evaluated independently.
    #[arg(long = "rule", required = true)]
    pub rule_ids: Vec<String>,
    /// Restrict the replay to these listings; defaults to a catalog sample.
    #[arg(long = "listing")]
    pub listing_ids: Vec<String>,
    #[arg(long, help = "Window start, YYYY-MM-DD or RFC 3339; defaults to full history")]
    pub start: Option<String>,
    #[arg(long, help = "Window end, YYYY-MM-DD or RFC 3339; defaults to now")]
    pub end: Option<String>,
    #[arg(long, help = "Evenly spaced replay points per listing")]
    pub sample_size: Option<usize>,
    #[arg(long, help = "Override the configured minimum margin percent")]
    pub min_margin: Option<Decimal>,
    #[arg(long, help = "Override the configured maximum step percent")]
    pub max_step: Option<Decimal>,
}

pub fn run(args: BacktestArgs) -> CommandResult {
    let start = match args.start.as_deref().map(parse_instant).transpose() {
        Ok(start) => start,
        Err(failure) => return failure,
    };
    let end = match args.end.as_deref().map(parse_instant).transpose() {
        Ok(end) => end,
        Err(failure) => return failure,
    };

    let config = match load_config("backtest") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("backtest") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_pool("backtest", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };
        let services = Services::new(&pool, config);
        let backtester = services.backtester();

        let overrides = if args.min_margin.is_none() && args.max_step.is_none() {
            None
        } else {
            Some(SafetyOverrides {
                min_margin_percent: args.min_margin,
                max_step_percent: args.max_step,
            })
        };
        let request = BacktestRequest {
            rule_ids: args.rule_ids.into_iter().map(RuleId).collect(),
            start,
            end,
            sample_size: args.sample_size,
            listing_ids: (!args.listing_ids.is_empty())
                .then(|| args.listing_ids.into_iter().map(ListingId).collect()),
            overrides,
        };

        let result = match backtester.run(request, None).await {
            Ok(report) => data_or_failure(
                "backtest",
                format!(
                    "{} rules over {} listings, {} points replayed, {} matches, {} blocks",
                    report.summary.rules_evaluated,
                    report.summary.listings_analyzed,
                    report.summary.points_replayed,
                    report.summary.matches,
                    report.summary.blocks
                ),
                &report,
            ),
            Err(error) => service_failure("backtest", &error),
        };

        pool.close().await;
        result
    })
}

/// Accepts a plain date (midnight UTC) or a full RFC 3339 timestamp.
fn parse_instant(raw: &str) -> Result<DateTime<Utc>, CommandResult> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
    }
    DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc)).map_err(|error| {
        CommandResult::failure(
            "backtest",
            "invalid_argument",
            format!("invalid date `{raw}` (expected YYYY-MM-DD or RFC 3339): {error}"),
            2,
        )
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::parse_instant;

    #[test]
    fn plain_date_becomes_midnight_utc() {
        let at = parse_instant("2026-08-01").expect("date should parse");
        assert_eq!((at.year(), at.month(), at.day()), (2026, 8, 1));
        assert_eq!(at.hour(), 0);
    }

    #[test]
    fn rfc3339_timestamp_is_accepted() {
        let at = parse_instant("2026-08-01T12:30:00Z").expect("timestamp should parse");
        assert_eq!(at.hour(), 12);
    }

    #[test]
    fn garbage_is_invalid_argument() {
        let failure = parse_instant("last tuesday").expect_err("garbage should fail");
        assert_eq!(failure.exit_code, 2);
    }
}
