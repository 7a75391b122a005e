//! Command line entry point for the CloudRec whited rule console.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use cloudrec_api::{GroupQuery, RuleConfigItem, RuleType, SaveRuleRecord, SubmittedAction};
use cloudrec_common::CloudRecError;
use cloudrec_console::{
    ActionListEditor, ConfigOverrides, ConsoleConfig, LockCoordinator, MutationGateway,
    RuleAggregator, RuleRecordStore, create_store, init_logging,
};

#[derive(Debug, Parser)]
#[command(name = "cloudrec-console", version, about = "Manage CloudRec whited rules")]
struct Cli {
    /// Configuration file (default: conf/console.yml, optional)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<String>,
    /// Store mode: remote or local
    #[arg(short = 'm', long = "mode", global = true)]
    mode: Option<String>,
    /// Comma separated server addresses for remote mode
    #[arg(long = "server", global = true, env = "CLOUDREC_SERVER")]
    server: Option<String>,
    #[arg(long = "username", global = true, env = "CLOUDREC_USERNAME")]
    username: Option<String>,
    #[arg(long = "password", global = true, env = "CLOUDREC_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Lock policy for local mode: grab or exclusive
    #[arg(long = "lock-policy", global = true)]
    lock_policy: Option<String>,
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            mode: self.mode.clone(),
            server_addrs: self.server.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            lock_policy: self.lock_policy.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// One row per rule code, global scope first
    Groups {
        /// Restrict to these rule codes (repeatable)
        #[arg(long = "code")]
        codes: Vec<String>,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        size: Option<u64>,
    },
    /// Rule codes available to the filter
    Codes,
    /// Records of one rule code
    Detail {
        rule_code: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        size: Option<u64>,
    },
    /// One record with its lock state
    Show { id: i64 },
    /// Take the edit lock of a record
    Grab { id: i64 },
    /// Give the edit lock back
    Release { id: i64 },
    Enable { id: i64 },
    Disable { id: i64 },
    /// Delete a record; cannot be undone
    Delete { id: i64 },
    /// Create a record, or update one when --id is given
    Save {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long = "code")]
        rule_code: String,
        #[arg(long = "name")]
        rule_name: String,
        #[arg(long = "type", default_value = "RULE_ENGINE")]
        rule_type: RuleType,
        #[arg(long = "desc")]
        rule_desc: Option<String>,
        /// Config item as key:OPERATOR:value (repeatable, ids follow the order given)
        #[arg(long = "item")]
        items: Vec<String>,
        /// Logic over item ids such as "1 && 2"; required with more than one item
        #[arg(long)]
        condition: Option<String>,
        /// Rego policy file, required for REGO rules
        #[arg(long = "rego-file")]
        rego_file: Option<PathBuf>,
        #[arg(long)]
        disabled: bool,
    },
    /// Operators accepted in config items
    Operators,
    /// Check a saved subscription action list (JSON array)
    Actions { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConsoleConfig::load(&cli.overrides())?;
    init_logging(&config.logging_config())?;

    let store = create_store(&config).await?;
    if let Err(e) = run(cli.command, store, config.page_size()).await {
        if let Some(err) = e.downcast_ref::<CloudRecError>() {
            let code = err.error_code();
            warn!(code = code.code, retryable = err.is_retryable(), "{}", code.message);
            if err.requires_refresh() {
                eprintln!("hint: the record changed, list it again before retrying");
            }
        }
        return Err(e);
    }
    Ok(())
}

async fn run(command: Command, store: Arc<dyn RuleRecordStore>, page_size: u64) -> anyhow::Result<()> {
    let aggregator = RuleAggregator::new(store.clone(), page_size);
    let coordinator = LockCoordinator::new(store.clone());
    let gateway = MutationGateway::new(store.clone());

    match command {
        Command::Groups { codes, page, size } => {
            let size = size.unwrap_or(aggregator.page_size());
            let result = aggregator
                .list_groups(&GroupQuery::with_codes(codes), page, size)
                .await?;
            print_json(&result)?;
        }
        Command::Codes => {
            for option in aggregator.rule_code_options().await? {
                println!("{}\t{}", option.rule_code, option.label);
            }
        }
        Command::Detail {
            rule_code,
            name,
            page,
            size,
        } => {
            let size = size.unwrap_or(aggregator.page_size());
            let result = aggregator
                .list_detail(&rule_code, name.as_deref(), page, size)
                .await?;
            if result.is_empty() {
                info!(rule_code = %rule_code, "No records");
            }
            print_json(&result)?;
        }
        Command::Show { id } => {
            let record = store.get_record(id).await?;
            info!(id, mode = ?LockCoordinator::view_mode(&record), "Record loaded");
            print_json(&record)?;
        }
        Command::Grab { id } => {
            let status = coordinator.acquire(id).await?;
            print_json(&status)?;
        }
        Command::Release { id } => {
            coordinator.release(id).await?;
        }
        Command::Enable { id } => {
            let record = store.get_record(id).await?;
            gateway.set_enabled(&record, true).await?;
        }
        Command::Disable { id } => {
            let record = store.get_record(id).await?;
            gateway.set_enabled(&record, false).await?;
        }
        Command::Delete { id } => {
            let record = store.get_record(id).await?;
            gateway.delete(&record).await?;
        }
        Command::Save {
            id,
            rule_code,
            rule_name,
            rule_type,
            rule_desc,
            items,
            condition,
            rego_file,
            disabled,
        } => {
            let rule_config_list = (1u32..)
                .zip(&items)
                .map(|(item_id, text)| RuleConfigItem::parse(item_id, text))
                .collect::<Result<Vec<_>, _>>()?;
            let rego_content = match rego_file {
                Some(path) => Some(std::fs::read_to_string(&path)?),
                None => None,
            };
            let form = SaveRuleRecord {
                id,
                rule_code,
                rule_name,
                rule_desc,
                rule_type,
                enabled: !disabled,
                rule_config_list,
                condition,
                rego_content,
            };
            let current = match id {
                Some(id) => Some(store.get_record(id).await?),
                None => None,
            };
            let saved = gateway.save(&form, current.as_ref()).await?;
            println!("{}", saved);
        }
        Command::Operators => {
            for operator in store.operators().await? {
                println!("{}", operator);
            }
        }
        Command::Actions { file } => {
            let saved: Vec<SubmittedAction> =
                serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let editor = ActionListEditor::from_saved(saved);
            for line in editor.summary() {
                println!("{}", line);
            }
            editor.submission()?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
