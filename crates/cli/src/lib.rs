pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use repricer_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "repricer",
    about = "Repricer operator CLI",
    long_about = "Manage pricing rules, review price recommendations, run what-if simulations and backtests, and operate the backing database.",
    after_help = "Examples:\n  repricer migrate && repricer seed\n  repricer simulate lst-dock-27\n  repricer backtest --rule rule-margin-floor --start 2026-05-01\n  repricer recs list --status PENDING"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Actor recorded on mutating operations.
    #[arg(long, global = true, default_value = "operator")]
    actor: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Manage the pricing rule catalog")]
    Rules(commands::rules::RulesArgs),
    #[command(about = "Review and act on price recommendations")]
    Recs(commands::recs::RecsArgs),
    #[command(about = "Evaluate active rules against live listings without persisting")]
    Simulate(commands::simulate::SimulateArgs),
    #[command(about = "Replay rules against historical prices to estimate their effect")]
    Backtest(commands::backtest::BacktestArgs),
    #[command(about = "Aggregate recommendation and price-change counts")]
    Stats {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    #[command(about = "Show a listing's price history and recorded changes")]
    History(commands::history::HistoryArgs),
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load deterministic demo fixtures into a migrated database")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn init_logging() {
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    let log_level = config.logging.level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Rules(args) => commands::rules::run(args, &cli.actor),
        Command::Recs(args) => commands::recs::run(args),
        Command::Simulate(args) => commands::simulate::run(args),
        Command::Backtest(args) => commands::backtest::run(args),
        Command::Stats { days } => commands::stats::run(days),
        Command::History(args) => commands::history::run(args),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
