use chrono::{Duration, Utc};
use clap::Args;
use repricer_core::domain::listing::ListingId;
use repricer_core::errors::ServiceError;
use repricer_core::stores::{ChangeLogStore, ListingStore, PriceHistoryStore, TimeWindow};
use serde::Serialize;

use crate::commands::{
    build_runtime, data_or_failure, load_config, open_pool, service_failure, CommandResult,
    Services,
};

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub listing_id: String,
    #[arg(long, default_value_t = 30, help = "How many days back to read")]
    pub days: i64,
}

#[derive(Debug, Serialize)]
struct HistoryReport {
    listing_id: String,
    title: String,
    days: i64,
    history: Vec<repricer_core::domain::listing::PriceHistoryPoint>,
    changes: Vec<repricer_core::domain::listing::PriceChangeLogEntry>,
}

pub fn run(args: HistoryArgs) -> CommandResult {
    if args.days < 1 {
        return CommandResult::failure(
            "history",
            "invalid_argument",
            "days must be at least 1",
            2,
        );
    }

    let config = match load_config("history") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("history") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_pool("history", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };
        let services = Services::new(&pool, config);

        let result = fetch_report(&services, ListingId(args.listing_id), args.days).await;
        pool.close().await;

        match result {
            Ok(report) => data_or_failure(
                "history",
                format!(
                    "{}: {} history points, {} recorded changes in {} days",
                    report.listing_id,
                    report.history.len(),
                    report.changes.len(),
                    report.days
                ),
                &report,
            ),
            Err(error) => service_failure("history", &error),
        }
    })
}

async fn fetch_report(
    services: &Services,
    listing_id: ListingId,
    days: i64,
) -> Result<HistoryReport, ServiceError> {
    let Some(listing) = services.listings.find_by_id(&listing_id).await? else {
        return Err(ServiceError::NotFound { entity: "listing", id: listing_id.0 });
    };

    let window = TimeWindow { start: Some(Utc::now() - Duration::days(days)), end: None };
    let history = services.history.history_for(&listing_id, &window).await?;
    let changes = services.changes.changes_for(&listing_id, &window).await?;

    Ok(HistoryReport { listing_id: listing.id.0, title: listing.title, days, history, changes })
}
