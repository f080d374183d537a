use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::de::DeserializeOwned;
use sheetbase::providers::google_sheets::GoogleSheetProvider;
use sheetbase::{Condition, EnvConfig, KeyGuard, Model, Query, Record};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheetbase")]
#[command(about = "Read and change rows of a Google Sheets table", long_about = None)]
struct Cli {
    /// Variable holding the spreadsheet id
    #[arg(long, default_value = sheetbase::config::STORE_ID_ENV)]
    store_var: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print matching rows as JSON
    Get {
        table: String,
        /// Conditions, e.g. '[{"key":"Name","value":"John"}]'
        #[arg(long = "where")]
        conditions: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
    },

    /// Append rows given as a JSON array of objects
    Insert {
        table: String,
        #[arg(long)]
        records: String,
    },

    /// Set fields on matching rows
    Update {
        table: String,
        /// JSON object of column -> value
        #[arg(long)]
        changes: String,
        #[arg(long = "where")]
        conditions: String,
        /// Select rows by the conditions alone, ignoring the `key` column
        #[arg(long)]
        no_key_guard: bool,
    },

    /// Delete matching rows
    Delete {
        table: String,
        #[arg(long = "where")]
        conditions: String,
    },
}

fn parse<T: DeserializeOwned>(what: &str, json: &str) -> anyhow::Result<T> {
    serde_json::from_str(json).with_context(|| format!("invalid {what} JSON"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let provider = GoogleSheetProvider::try_new_from_env().await?;
    let model = Model::new(provider, EnvConfig::new(cli.store_var));

    let output = match cli.command {
        Command::Get {
            table,
            conditions,
            offset,
            limit,
        } => {
            let query = Query {
                conditions: conditions
                    .as_deref()
                    .map(|c| parse::<Vec<Condition>>("conditions", c))
                    .transpose()?,
                offset,
                limit,
            };
            serde_json::to_value(model.get(&table, &query).await?)?
        }
        Command::Insert { table, records } => {
            let records: Vec<Record> = parse("records", &records)?;
            serde_json::to_value(model.insert_data(&table, &records).await?)?
        }
        Command::Update {
            table,
            changes,
            conditions,
            no_key_guard,
        } => {
            let changes: Record = parse("changes", &changes)?;
            let conditions: Vec<Condition> = parse("conditions", &conditions)?;
            let model = if no_key_guard {
                model.with_key_guard(KeyGuard::Disabled)
            } else {
                model
            };
            serde_json::to_value(model.update_data(&table, &changes, &conditions).await?)?
        }
        Command::Delete { table, conditions } => {
            let conditions: Vec<Condition> = parse("conditions", &conditions)?;
            serde_json::to_value(model.delete_data(&table, &conditions).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
