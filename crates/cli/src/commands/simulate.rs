use clap::Args;
use repricer_core::domain::listing::ListingId;
use repricer_core::domain::rule::RuleId;
use repricer_core::engine::SafetyOverrides;
use rust_decimal::Decimal;

use crate::commands::{
    build_runtime, data_or_failure, load_config, open_pool, service_failure, CommandResult,
    Services,
};

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Listing ids to evaluate. One id runs a single what-if; several run a
    /// batch with a summary.
    #[arg(required = true)]
    pub listing_ids: Vec<String>,
    /// Restrict evaluation to these rule ids (still priority-ordered).
    #[arg(long = "rule")]
    pub rule_ids: Vec<String>,
    #[arg(long, help = "Override the configured minimum margin percent")]
    pub min_margin: Option<Decimal>,
    #[arg(long, help = "Override the configured maximum step percent")]
    pub max_step: Option<Decimal>,
}

pub fn run(args: SimulateArgs) -> CommandResult {
    let config = match load_config("simulate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("simulate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_pool("simulate", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };
        let services = Services::new(&pool, config);
        let simulator = services.simulator();

        let rule_ids: Vec<RuleId> = args.rule_ids.into_iter().map(RuleId).collect();
        let rule_filter = (!rule_ids.is_empty()).then_some(rule_ids.as_slice());
        let overrides = overrides_from(args.min_margin, args.max_step);

        let result = if args.listing_ids.len() == 1 {
            let listing_id = ListingId(args.listing_ids.into_iter().next().unwrap_or_default());
            match simulator.simulate_one(&listing_id, rule_filter, overrides.as_ref()).await {
                Ok(proposal) => {
                    let message = if proposal.is_blocked() {
                        format!("proposal for {} blocked by safety guard", listing_id.0)
                    } else if proposal.changed() {
                        format!(
                            "{}: {} -> {}",
                            listing_id.0, proposal.current_price, proposal.proposed_price
                        )
                    } else {
                        format!("no rule changed the price of {}", listing_id.0)
                    };
                    data_or_failure("simulate", message, &proposal)
                }
                Err(error) => service_failure("simulate", &error),
            }
        } else {
            let listing_ids: Vec<ListingId> =
                args.listing_ids.into_iter().map(ListingId).collect();
            match simulator
                .simulate_batch(&listing_ids, rule_filter, overrides.as_ref(), None)
                .await
            {
                Ok(batch) => data_or_failure(
                    "simulate",
                    format!(
                        "{} listings evaluated, {} changed, {} blocked",
                        batch.summary.total, batch.summary.changed, batch.summary.blocked
                    ),
                    &batch,
                ),
                Err(error) => service_failure("simulate", &error),
            }
        };

        pool.close().await;
        result
    })
}

fn overrides_from(
    min_margin: Option<Decimal>,
    max_step: Option<Decimal>,
) -> Option<SafetyOverrides> {
    if min_margin.is_none() && max_step.is_none() {
        return None;
    }
    Some(SafetyOverrides { min_margin_percent: min_margin, max_step_percent: max_step })
}
