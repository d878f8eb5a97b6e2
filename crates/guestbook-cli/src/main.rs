use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use guestbook_api::{EntryView, GuestbookApi};
use guestbook_core::Key;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "gb")]
#[command(about = "Guestbook record store CLI")]
struct Cli {
    #[arg(long, default_value = "./guestbook.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Append one entry; reads stdin when --content is omitted.
    Sign(SignArgs),
    /// Newest entries reduced to device/result summaries.
    List(LimitArgs),
    /// Newest entries with full content.
    Guestbook(LimitArgs),
    /// Show one entry by key token.
    Show(ShowArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct SignArgs {
    #[arg(long)]
    content: Option<String>,
}

#[derive(Debug, Args)]
struct LimitArgs {
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Args)]
struct ShowArgs {
    token: String,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = GuestbookApi::new(cli.db);
    match cli.command {
        Command::Db { command } => run_db(command, &api),
        Command::Sign(args) => run_sign(args, &api),
        Command::List(args) => {
            let summaries = api.list_summaries(args.limit)?;
            emit_json(serde_json::json!({ "summaries": summaries }))
        }
        Command::Guestbook(args) => {
            let entries = api.list_full(args.limit)?;
            emit_json(serde_json::json!({ "entries": entries }))
        }
        Command::Show(args) => run_show(&args, &api),
    }
}

fn run_db(command: DbCommand, api: &GuestbookApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize migrate result")?)
        }
        DbCommand::IntegrityCheck => {
            let report = api.integrity_check()?;
            emit_json(serde_json::to_value(&report).context("failed to serialize integrity report")?)
        }
    }
}

fn run_sign(args: SignArgs, api: &GuestbookApi) -> Result<()> {
    let content = match args.content {
        Some(content) => content.into_bytes(),
        None => {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer).context("failed to read content from stdin")?;
            buffer
        }
    };
    let signed = api.sign(&content)?;
    emit_json(serde_json::to_value(&signed).context("failed to serialize sign result")?)
}

fn run_show(args: &ShowArgs, api: &GuestbookApi) -> Result<()> {
    let record = api.get_item(&args.token)?;
    let key = Key::decode(&args.token)?;
    emit_json(serde_json::to_value(EntryView::new(key, &record)).context("failed to serialize entry")?)
}
