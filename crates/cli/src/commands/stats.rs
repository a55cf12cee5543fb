use crate::commands::{
    build_runtime, data_or_failure, load_config, open_pool, service_failure, CommandResult,
    Services,
};

pub fn run(days: i64) -> CommandResult {
    let config = match load_config("stats") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("stats") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_pool("stats", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };
        let services = Services::new(&pool, config);
        let workflow = services.workflow();

        let result = match workflow.stats(days).await {
            Ok(stats) => data_or_failure(
                "stats",
                format!(
                    "last {} days: {} recommendations, {} pending, {} price changes",
                    stats.period_days, stats.total, stats.pending, stats.price_changes
                ),
                &stats,
            ),
            Err(error) => service_failure("stats", &error),
        };

        pool.close().await;
        result
    })
}
