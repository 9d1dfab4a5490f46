use catalog_tables::{
    config::{database, settings},
    core::{cache::ObjectCache, mapping::CompatMap, migration},
    errors::Result,
};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog-tables")]
#[command(about = "Structured product tables for legacy product metadata", long_about = None)]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Move legacy product metadata into the structured tables.
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("catalog-tables failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = settings::load_settings_or_default(&cli.config)?;

    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    match cli.command {
        Command::Migrate => {
            let cache = ObjectCache::new();
            let map = CompatMap::build();
            let report = migration::migrate_all(
                &db,
                &cache,
                &map,
                &settings.catalog,
                &settings.migration,
            )
            .await?;
            println!(
                "migrated {} entities, {} failed, {} already migrated",
                report.migrated, report.failed, report.skipped
            );
            for outcome in &report.outcomes {
                if let migration::EntityOutcome::Failed { entity_id, error } = outcome {
                    println!("  entity {entity_id}: {error}");
                }
            }
            report.into_result().map(|_| ())
        }
    }
}
