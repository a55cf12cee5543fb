use repricer_db::{migrations, DemoSeedDataset};

use crate::commands::{build_runtime, load_config, open_pool, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = match open_pool("seed", &config).await {
            Ok(pool) => pool,
            Err(failure) => return Err(failure),
        };

        let outcome = async {
            migrations::run_pending(&pool).await.map_err(|error| {
                CommandResult::failure("seed", "migration", error.to_string(), 4)
            })?;

            let seeded = DemoSeedDataset::load(&pool).await.map_err(|error| {
                CommandResult::failure("seed", "seed_execution", error.to_string(), 5)
            })?;

            let verification = DemoSeedDataset::verify(&pool).await.map_err(|error| {
                CommandResult::failure("seed", "seed_verification", error.to_string(), 6)
            })?;

            if !verification.all_present {
                let failed: Vec<&str> = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                    .collect();
                let message = if failed.is_empty() {
                    "seed verification failed".to_string()
                } else {
                    format!("seed verification failed for checks: {}", failed.join(", "))
                };
                return Err(CommandResult::failure("seed", "seed_verification", message, 5));
            }

            Ok(seeded)
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: {} listings, {} rules, {} recommendations",
                seeded.listings.len(),
                seeded.rules.len(),
                seeded.recommendations.len()
            ),
        ),
        Err(failure) => failure,
    }
}
