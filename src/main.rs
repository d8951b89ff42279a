// ABOUTME: CLI entry point for pg-user-dump
// ABOUTME: Parses arguments, connects, runs the dump, and routes the SQL to its sinks

use clap::Parser;
use pg_user_dump::config::ConnectionSettings;
use pg_user_dump::dump::{self, FailurePolicy, IdentifierArgs, TableCatalog};
use pg_user_dump::postgres;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pg-user-dump")]
#[command(
    about = "Export one user's rows as replayable SQL INSERT statements",
    long_about = "Export one user's rows as replayable SQL INSERT statements.\n\n\
                  Connection settings come from DATABASE_URL, or from DB_HOST, DB_PORT, \
                  DB_USER, DB_NAME (and optionally DB_PASS and DB_SSLMODE)."
)]
struct Cli {
    /// User id to dump (same as --user-id)
    #[arg(value_name = "USER_ID")]
    user: Option<String>,
    /// Dump this user id
    #[arg(long = "user-id", alias = "user_id", value_name = "ID")]
    user_id: Option<String>,
    /// Look up the user owning this account id and dump them
    #[arg(long = "account-id", alias = "account_id", value_name = "ID")]
    account_id: Option<String>,
    /// Also write the SQL to user_<id>_dump.sql
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    output: bool,
    /// Directory the --output file is written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Abort on the first table that fails instead of skipping it
    #[arg(long)]
    fail_fast: bool,
    /// Connection attempts to retry before giving up
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries nothing but SQL
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let identifier = IdentifierArgs {
        positional: cli.user,
        user_id: cli.user_id,
        account_id: cli.account_id,
    }
    .into_identifier()?;

    let policy = if cli.fail_fast {
        FailurePolicy::Abort
    } else {
        FailurePolicy::SkipTable
    };
    let catalog = TableCatalog::user_tables()?;

    let settings = ConnectionSettings::from_env()?;
    tracing::debug!("Connection settings: {:?}", settings);
    let client = postgres::connect_with_retry(&settings.connection_url()?, cli.retries).await?;

    let output = dump::run(&client, &identifier, &catalog, policy).await?;

    dump::write_stdout(&output)?;
    if cli.output {
        dump::write_file(&output, &cli.output_dir)?;
    }

    Ok(())
}
