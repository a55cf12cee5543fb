use clap::{Args, Subcommand};
use repricer_core::domain::listing::ListingId;
use repricer_core::domain::recommendation::{RecommendationId, RecommendationStatus};
use repricer_core::stores::{Page, RecommendationFilter};

use crate::commands::{
    build_runtime, data_or_failure, load_config, open_pool, service_failure, CommandResult,
    Services,
};

#[derive(Debug, Args)]
pub struct RecsArgs {
    #[command(subcommand)]
    command: RecsCommand,
}

#[derive(Debug, Subcommand)]
enum RecsCommand {
    #[command(about = "List recommendations, newest first")]
    List {
        #[arg(long, help = "Filter by status: PENDING|APPROVED|REJECTED|APPLIED|EXPIRED")]
        status: Option<String>,
        #[arg(long, help = "Filter by listing id")]
        listing: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    #[command(about = "Show one recommendation with its listing summary")]
    Show { id: String },
    #[command(about = "Approve a pending, unexpired recommendation")]
    Approve {
        id: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    #[command(about = "Reject a pending recommendation with a reason")]
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
    #[command(about = "Approve every pending, unexpired id in the set")]
    BulkApprove {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    #[command(about = "Flip overdue pending recommendations to EXPIRED")]
    Expire,
}

pub fn run(args: RecsArgs) -> CommandResult {
    let config = match load_config("recs") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("recs") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_pool("recs", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };
        let services = Services::new(&pool, config);
        let workflow = services.workflow();

        let result = match args.command {
            RecsCommand::List { status, listing, limit, offset } => {
                let status = match status.as_deref().map(parse_status).transpose() {
                    Ok(status) => status,
                    Err(failure) => {
                        pool.close().await;
                        return failure;
                    }
                };
                let filter = RecommendationFilter { status, listing_id: listing.map(ListingId) };
                match workflow.list(filter, Page { limit, offset }).await {
                    Ok(page) => data_or_failure(
                        "recs",
                        format!("{} of {} recommendations", page.items.len(), page.total),
                        &page,
                    ),
                    Err(error) => service_failure("recs", &error),
                }
            }
            RecsCommand::Show { id } => match workflow.get(&RecommendationId(id)).await {
                Ok(detail) => data_or_failure(
                    "recs",
                    format!("recommendation {}", detail.recommendation.id.0),
                    &detail,
                ),
                Err(error) => service_failure("recs", &error),
            },
            RecsCommand::Approve { id, by } => {
                match workflow.approve(&RecommendationId(id), &by).await {
                    Ok(recommendation) => data_or_failure(
                        "recs",
                        format!("approved recommendation {}", recommendation.id.0),
                        &recommendation,
                    ),
                    Err(error) => service_failure("recs", &error),
                }
            }
            RecsCommand::Reject { id, reason } => {
                match workflow.reject(&RecommendationId(id), &reason).await {
                    Ok(recommendation) => data_or_failure(
                        "recs",
                        format!("rejected recommendation {}", recommendation.id.0),
                        &recommendation,
                    ),
                    Err(error) => service_failure("recs", &error),
                }
            }
            RecsCommand::BulkApprove { ids, by } => {
                let requested = ids.len();
                let ids: Vec<RecommendationId> = ids.into_iter().map(RecommendationId).collect();
                match workflow.bulk_approve(&ids, &by).await {
                    Ok(approved) => CommandResult::success_with_data(
                        "recs",
                        format!("approved {approved} of {requested} recommendations"),
                        serde_json::json!({ "requested": requested, "approved": approved }),
                    ),
                    Err(error) => service_failure("recs", &error),
                }
            }
            RecsCommand::Expire => match workflow.expire_overdue().await {
                Ok(expired) => CommandResult::success_with_data(
                    "recs",
                    format!("expired {expired} overdue recommendations"),
                    serde_json::json!({ "expired": expired }),
                ),
                Err(error) => service_failure("recs", &error),
            },
        };

        pool.close().await;
        result
    })
}

fn parse_status(raw: &str) -> Result<RecommendationStatus, CommandResult> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PENDING" => Ok(RecommendationStatus::Pending),
        "APPROVED" => Ok(RecommendationStatus::Approved),
        "REJECTED" => Ok(RecommendationStatus::Rejected),
        "APPLIED" => Ok(RecommendationStatus::Applied),
        "EXPIRED" => Ok(RecommendationStatus::Expired),
        other => Err(CommandResult::failure(
            "recs",
            "invalid_argument",
            format!("unknown status `{other}` (expected PENDING|APPROVED|REJECTED|APPLIED|EXPIRED)"),
            2,
        )),
    }
}
