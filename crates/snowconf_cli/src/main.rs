//! SnowConf command-line entry point.
//!
//! # Responsibility
//! - Mint and decode ids from a shell.
//! - Read and write config items in a SQLite file.
//!
//! # Invariants
//! - File logging starts only when `--log-dir` is given.
//! - Failures exit with a non-zero status and a one-line message on stderr.

use chrono::{DateTime, SecondsFormat};
use clap::{Args, Parser, Subcommand};
use snowconf_core::db::open_db;
use snowconf_core::id::validate_machine_id;
use snowconf_core::{
    default_log_level, generate_id, init_global_generator, init_logging, parse_id, ConfigItem,
    ConfigService, DataType, IdGenerator, SetConfigRequest, SqliteConfigRepository,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "snowconf",
    version,
    about = "Snowflake ids and a SQLite config store"
)]
struct Cli {
    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "SNOWCONF_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files.
    #[arg(long, global = true, env = "SNOWCONF_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mint or decode ids.
    #[command(subcommand)]
    Id(IdCommand),
    /// Manage config items.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum IdCommand {
    /// Print freshly minted ids, one per line.
    Next {
        /// 0-1023; derived from the host address when omitted.
        #[arg(long, env = "SNOWCONF_MACHINE_ID", allow_negative_numbers = true)]
        machine_id: Option<i64>,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Decode an id into timestamp, machine id and sequence.
    Parse { id: u64 },
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// SQLite database file.
    #[arg(long, env = "SNOWCONF_DB")]
    db: PathBuf,
    /// Machine id used when new items are created.
    #[arg(long, env = "SNOWCONF_MACHINE_ID", allow_negative_numbers = true)]
    machine_id: Option<i64>,
}

#[derive(Debug, Args)]
struct ScopeArgs {
    #[arg(long)]
    app: String,
    #[arg(long = "env")]
    environment: String,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Insert or update one item.
    Set {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        #[arg(long = "type", default_value = "string")]
        data_type: DataType,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        inactive: bool,
        #[arg(long)]
        operator: Option<String>,
    },
    /// Print the value of an active item.
    Get {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        key: String,
    },
    /// Delete one item.
    Delete {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        key: String,
    },
    /// List items of one application environment.
    List {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
        /// Print the page as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print active items as a typed JSON object.
    Map {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Copy items missing in the target environment.
    Copy {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        app: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        operator: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_exit module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    match cli.command {
        Command::Id(command) => run_id(command),
        Command::Config(command) => run_config(command),
    }
}

fn run_id(command: IdCommand) -> CliResult {
    match command {
        IdCommand::Next { machine_id, count } => {
            let generator = match machine_id {
                Some(raw) => Some(IdGenerator::new(validate_machine_id(raw)?)?),
                None => None,
            };
            for _ in 0..count {
                let id = match &generator {
                    Some(generator) => generator.next_id()?,
                    None => generate_id()?,
                };
                println!("{id}");
            }
            Ok(())
        }
        IdCommand::Parse { id } => {
            let info = parse_id(id);
            let time = i64::try_from(info.timestamp_millis)
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| "out of range".to_string());
            println!("{info} time={time}");
            Ok(())
        }
    }
}

fn run_config(command: ConfigCommand) -> CliResult {
    match command {
        ConfigCommand::Set {
            store,
            scope,
            key,
            value,
            data_type,
            description,
            inactive,
            operator,
        } => {
            install_machine_id(store.machine_id)?;
            let conn = open_db(&store.db)?;
            let service = ConfigService::with_global_ids(SqliteConfigRepository::new(&conn));
            let mut request = SetConfigRequest::new(scope.app, scope.environment, key, value);
            request.data_type = data_type;
            request.description = description;
            request.is_active = !inactive;
            request.operator = operator;
            let item = service.set_config(&request)?;
            println!("{}", item_line(&item));
            Ok(())
        }
        ConfigCommand::Get { store, scope, key } => {
            let conn = open_db(&store.db)?;
            let service = ConfigService::with_global_ids(SqliteConfigRepository::new(&conn));
            println!(
                "{}",
                service.get_config_value(&scope.app, &scope.environment, &key)?
            );
            Ok(())
        }
        ConfigCommand::Delete { store, scope, key } => {
            let conn = open_db(&store.db)?;
            let service = ConfigService::with_global_ids(SqliteConfigRepository::new(&conn));
            service.delete_config(&scope.app, &scope.environment, &key)?;
            println!("deleted {}/{}/{}", scope.app, scope.environment, key);
            Ok(())
        }
        ConfigCommand::List {
            store,
            scope,
            page,
            size,
            json,
        } => {
            let conn = open_db(&store.db)?;
            let service = ConfigService::with_global_ids(SqliteConfigRepository::new(&conn));
            let page = service.configs_page(&scope.app, &scope.environment, page, size)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for item in &page.items {
                    println!("{}", item_line(item));
                }
                println!(
                    "page {}/{} ({} items)",
                    page.page, page.total_pages, page.total
                );
            }
            Ok(())
        }
        ConfigCommand::Map { store, scope } => {
            let conn = open_db(&store.db)?;
            let service = ConfigService::with_global_ids(SqliteConfigRepository::new(&conn));
            let map = service.app_configs_as_map(&scope.app, &scope.environment)?;
            println!("{}", serde_json::to_string_pretty(&map)?);
            Ok(())
        }
        ConfigCommand::Copy {
            store,
            app,
            from,
            to,
            operator,
        } => {
            install_machine_id(store.machine_id)?;
            let conn = open_db(&store.db)?;
            let service = ConfigService::with_global_ids(SqliteConfigRepository::new(&conn));
            let created = service.copy_environment(&app, &from, &to, operator.as_deref())?;
            for item in &created {
                println!("{}", item_line(item));
            }
            println!("copied {} items from {from} to {to}", created.len());
            Ok(())
        }
    }
}

/// Pins the process-wide generator to an explicit machine id.
fn install_machine_id(machine_id: Option<i64>) -> CliResult {
    if let Some(raw) = machine_id {
        init_global_generator(validate_machine_id(raw)?)?;
    }
    Ok(())
}

fn item_line(item: &ConfigItem) -> String {
    format!(
        "{} {}/{}/{} = {} ({}, v{}{})",
        item.id,
        item.app_name,
        item.environment,
        item.config_key,
        item.config_value,
        item.data_type,
        item.version,
        if item.is_active { "" } else { ", inactive" }
    )
}
