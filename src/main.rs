//! user-store
//!
//! Command line front end for the users table repository. Every subcommand
//! maps to one repository operation and prints JSON on stdout.

use anyhow::{bail, Context, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use user_store::config::Settings;
use user_store::db::models::{attributes_to_json, json_to_attribute};
use user_store::db::{Outcome, UserRecord, UserRepository};
use user_store::logging;

/// Manage the DynamoDB users table
#[derive(Parser, Debug)]
#[command(name = "user-store")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DynamoDB endpoint URL (overrides DYNAMODB_ENDPOINT_URL, e.g. DynamoDB Local)
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Users table name (overrides USERS_TABLE)
    #[arg(long, global = true)]
    table: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also write JSON logs to this file (10MB rotation)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether the users table exists
    Exists,
    /// List all tables in the account
    ListTables,
    /// Create a table with the users schema and wait for it to become active
    CreateTable {
        /// Table name (defaults to the configured users table)
        name: Option<String>,
    },
    /// Delete the users table and all of its records
    DeleteTable,
    /// Add or replace a user
    Add {
        #[arg(long)]
        full_name: String,
        /// Generated when omitted
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Fetch every record for a user id
    Get { user_id: String },
    /// Look users up through the name index
    FindByName { name: String },
    /// Set fields on an existing user
    Update {
        user_id: String,
        full_name: String,
        /// Field assignment as key=value; the value is parsed as JSON when possible
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Delete a user by id and full name
    Delete { user_id: String, full_name: String },
    /// Print the effective settings (secrets omitted)
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load()?;
    if let Some(url) = args.endpoint_url {
        settings.dynamodb_endpoint_url = Some(url);
    }
    if let Some(table) = args.table {
        settings.users_table = table;
    }
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }

    logging::init_tracing(&settings.log_level, args.log_file.as_deref())
        .context("Failed to initialise logging")?;

    tracing::debug!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        target_service = %settings.target_display(),
        "Starting"
    );

    let mut repo = UserRepository::connect(&settings).await;
    let output = run(&mut repo, &settings, args.command).await?;
    print_json(&output)
}

async fn run(repo: &mut UserRepository, settings: &Settings, command: Command) -> Result<Value> {
    let value = match command {
        Command::Exists => {
            let exists = repo.exists().await?;
            json!({ "table": settings.users_table, "exists": exists })
        }
        Command::ListTables => serde_json::to_value(repo.list_tables().await?)?,
        Command::CreateTable { name } => {
            let name = name.unwrap_or_else(|| settings.users_table.clone());
            serde_json::to_value(repo.create_table(&name).await?)?
        }
        Command::DeleteTable => {
            repo.delete_table().await?;
            json!({ "deleted": true })
        }
        Command::Add { full_name, user_id } => {
            let user_id = user_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let outcome = repo.add_user(&user_id, &full_name).await;
            outcome_json(outcome.map(|_| json!({ "user_id": user_id, "full_name": full_name })))?
        }
        Command::Get { user_id } => {
            outcome_json(repo.query_by_user_id(&user_id).await.map(records_json))?
        }
        Command::FindByName { name } => {
            outcome_json(repo.query_by_user_name(&name).await.map(records_json))?
        }
        Command::Update {
            user_id,
            full_name,
            set,
        } => {
            let fields = parse_assignments(&set)?;
            let outcome = repo.update_user(&user_id, &full_name, fields).await;
            outcome_json(outcome.map(|updated| attributes_to_json(&updated)))?
        }
        Command::Delete { user_id, full_name } => {
            let outcome = repo.delete_user_by_id(&user_id, &full_name).await;
            outcome_json(outcome.map(|_| json!({ "deleted": true })))?
        }
        Command::ShowConfig => serde_json::to_value(settings)?,
    };
    Ok(value)
}

fn records_json(records: Vec<UserRecord>) -> Value {
    Value::Array(records.iter().map(UserRecord::to_json).collect())
}

/// Record operations have already logged their failure; the CLI still
/// exits non-zero so scripts notice.
fn outcome_json(outcome: Outcome<Value>) -> Result<Value> {
    match outcome {
        Outcome::Success(value) => Ok(value),
        Outcome::NotFound => bail!("record not found"),
        Outcome::Failed(err) => Err(err.into()),
    }
}

fn parse_assignments(assignments: &[String]) -> Result<BTreeMap<String, AttributeValue>> {
    assignments
        .iter()
        .map(|assignment| {
            let (key, raw) = assignment
                .split_once('=')
                .with_context(|| format!("expected KEY=VALUE, got {:?}", assignment))?;
            let value = serde_json::from_str::<Value>(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((key.trim().to_string(), json_to_attribute(&value)))
        })
        .collect()
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
