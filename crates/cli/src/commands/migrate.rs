use repricer_db::migrations;

use crate::commands::{build_runtime, load_config, open_pool, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = match open_pool("migrate", &config).await {
            Ok(pool) => pool,
            Err(failure) => return Err(failure),
        };

        let outcome = migrations::run_pending(&pool).await.map_err(|error| {
            CommandResult::failure("migrate", "migration", error.to_string(), 4)
        });
        pool.close().await;
        outcome
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}
