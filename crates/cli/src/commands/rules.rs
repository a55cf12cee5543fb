use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use repricer_core::domain::rule::{RuleDraft, RuleId, RuleUpdate};

use crate::commands::{
    build_runtime, data_or_failure, load_config, open_pool, service_failure, CommandResult,
    Services,
};

#[derive(Debug, Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    command: RulesCommand,
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    #[command(about = "List pricing rules")]
    List {
        #[arg(long, help = "Only rules that are currently active")]
        active: bool,
    },
    #[command(about = "Show one pricing rule")]
    Show { id: String },
    #[command(about = "Create a pricing rule from a JSON draft")]
    Create {
        #[arg(long, conflicts_with = "json", help = "Path to a JSON rule draft")]
        file: Option<PathBuf>,
        #[arg(long, help = "Inline JSON rule draft")]
        json: Option<String>,
    },
    #[command(about = "Apply a partial JSON update to a pricing rule")]
    Update {
        id: String,
        #[arg(long, help = "Inline JSON rule update; omitted fields keep their value")]
        json: String,
    },
    #[command(about = "Mark a rule active so the engine evaluates it")]
    Activate { id: String },
    #[command(about = "Take a rule out of evaluation without deleting it")]
    Deactivate { id: String },
    #[command(about = "Delete a pricing rule")]
    Delete { id: String },
}

pub fn run(args: RulesArgs, actor: &str) -> CommandResult {
    let config = match load_config("rules") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("rules") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_pool("rules", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };
        let services = Services::new(&pool, config);
        let catalog = services.catalog();

        let result = match args.command {
            RulesCommand::List { active } => match catalog.list(active).await {
                Ok(rules) => {
                    data_or_failure("rules", format!("{} rules", rules.len()), &rules)
                }
                Err(error) => service_failure("rules", &error),
            },
            RulesCommand::Show { id } => match catalog.get(&RuleId(id)).await {
                Ok(rule) => data_or_failure("rules", format!("rule {}", rule.id.0), &rule),
                Err(error) => service_failure("rules", &error),
            },
            RulesCommand::Create { file, json } => match read_draft(file, json) {
                Ok(draft) => match catalog.create(draft, actor).await {
                    Ok(rule) => {
                        data_or_failure("rules", format!("created rule {}", rule.id.0), &rule)
                    }
                    Err(error) => service_failure("rules", &error),
                },
                Err(failure) => failure,
            },
            RulesCommand::Update { id, json } => {
                match serde_json::from_str::<RuleUpdate>(&json) {
                    Ok(update) => match catalog.update(&RuleId(id), update, actor).await {
                        Ok(rule) => {
                            data_or_failure("rules", format!("updated rule {}", rule.id.0), &rule)
                        }
                        Err(error) => service_failure("rules", &error),
                    },
                    Err(error) => CommandResult::failure(
                        "rules",
                        "invalid_argument",
                        format!("invalid rule update JSON: {error}"),
                        2,
                    ),
                }
            }
            RulesCommand::Activate { id } => {
                match catalog.set_active(&RuleId(id), true, actor).await {
                    Ok(rule) => {
                        data_or_failure("rules", format!("rule {} is active", rule.id.0), &rule)
                    }
                    Err(error) => service_failure("rules", &error),
                }
            }
            RulesCommand::Deactivate { id } => {
                match catalog.set_active(&RuleId(id), false, actor).await {
                    Ok(rule) => {
                        data_or_failure("rules", format!("rule {} is inactive", rule.id.0), &rule)
                    }
                    Err(error) => service_failure("rules", &error),
                }
            }
            RulesCommand::Delete { id } => match catalog.delete(&RuleId(id.clone()), actor).await {
                Ok(()) => CommandResult::success("rules", format!("deleted rule {id}")),
                Err(error) => service_failure("rules", &error),
            },
        };

        pool.close().await;
        result
    })
}

fn read_draft(file: Option<PathBuf>, json: Option<String>) -> Result<RuleDraft, CommandResult> {
    let raw = match (file, json) {
        (Some(path), None) => fs::read_to_string(&path).map_err(|error| {
            CommandResult::failure(
                "rules",
                "invalid_argument",
                format!("could not read draft file `{}`: {error}", path.display()),
                2,
            )
        })?,
        (None, Some(inline)) => inline,
        _ => {
            return Err(CommandResult::failure(
                "rules",
                "invalid_argument",
                "exactly one of --file or --json is required",
                2,
            ));
        }
    };

    serde_json::from_str::<RuleDraft>(&raw).map_err(|error| {
        CommandResult::failure(
            "rules",
            "invalid_argument",
            format!("invalid rule draft JSON: {error}"),
            2,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::read_draft;

    #[test]
    fn inline_draft_decodes_tagged_payloads() {
        let json = r#"{
            "name": "undercut",
            "rule_type": "COMPETITOR_BASED",
            "conditions": [{"type": "COMPETITOR_LOWER", "threshold": 5}],
            "actions": [{"type": "ADJUST_PERCENT", "value": -3}]
        }"#;

        let draft = read_draft(None, Some(json.to_string())).expect("draft should decode");
        assert_eq!(draft.name, "undercut");
        assert_eq!(draft.actions.len(), 1);
        assert!(draft.is_active);
    }

    #[test]
    fn missing_source_is_invalid_argument() {
        let failure = read_draft(None, None).expect_err("no source should fail");
        assert_eq!(failure.exit_code, 2);
    }

    #[test]
    fn malformed_json_is_invalid_argument() {
        let failure =
            read_draft(None, Some("{not json".to_string())).expect_err("bad JSON should fail");
        assert_eq!(failure.exit_code, 2);
        assert!(failure.output.contains("invalid rule draft JSON"));
    }
}
