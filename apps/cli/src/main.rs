//! histsync — incremental downloader for historical time-series data.
//!
//! Commands:
//! - `download` — fetch the uncovered parts of a time window from a provider
//! - `providers` — list configured adapters with capabilities and limits

mod cli;
mod config;
mod providers;
mod registry;

use anyhow::{bail, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use histsync_core::executor::CancelToken;
use histsync_core::provider::ProviderRegistry;
use histsync_core::sync::{EntitySelector, SyncRequest, SyncService};
use histsync_core::types::{EntityId, ProviderId};
use histsync_storage_sqlite::{create_pool, init, run_migrations, spawn_writer, SqliteSyncStore};

use crate::cli::{parse_timestamp, Cli, Commands};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    config::init_tracing();

    let args = Cli::parse();
    let app_config = AppConfig::from_env();

    match args.command {
        Commands::Providers => {
            let (registry, _) = load_registry(&app_config)?;
            print_providers(&registry);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Download {
            provider,
            entities,
            all,
            start,
            end,
            json,
        } => {
            let selector = match (all, entities.is_empty()) {
                (true, true) => EntitySelector::All,
                (true, false) => bail!("--all cannot be combined with explicit entities"),
                (false, true) => bail!("name at least one entity, or pass --all"),
                (false, false) => {
                    EntitySelector::Explicit(entities.into_iter().map(EntityId::new).collect())
                }
            };
            let start = parse_timestamp(&start)?;
            let end = match end {
                Some(raw) => parse_timestamp(&raw)?,
                None => chrono::Utc::now(),
            };
            let request = SyncRequest::new(ProviderId::new(provider), selector, start, end);

            download(&app_config, request, json).await
        }
    }
}

async fn download(
    app_config: &AppConfig,
    request: SyncRequest,
    json: bool,
) -> Result<ExitCode> {
    let db_path = init(&app_config.data_dir)?;
    tracing::info!("Database path in use: {}", db_path);
    let pool = create_pool(&db_path)?;
    run_migrations(&pool)?;
    let writer = spawn_writer((*pool).clone());
    let store = Arc::new(SqliteSyncStore::new(pool, writer));

    let (registry, entity_registry) = load_registry(app_config)?;
    let service = SyncService::new(registry, entity_registry, store, app_config.sync)?;

    // Ctrl-C flips the token; in-flight tasks finish and commit, the rest
    // are reported cancelled.
    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight tasks");
            watcher.cancel();
        }
    });

    let report = service.sync(&request, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn load_registry(
    app_config: &AppConfig,
) -> Result<(Arc<ProviderRegistry>, Arc<registry::AppEntityRegistry>)> {
    let specs = match &app_config.providers_file {
        Some(path) => registry::load_specs(path)?,
        None => {
            tracing::warn!("HISTSYNC_PROVIDERS is not set; no providers configured");
            Vec::new()
        }
    };
    registry::build(specs)
}

fn print_providers(registry: &ProviderRegistry) {
    if registry.is_empty() {
        println!("No providers configured. Point HISTSYNC_PROVIDERS at a provider file.");
        return;
    }
    for id in registry.ids() {
        if let Some(adapter) = registry.get(&id) {
            let limits = adapter.limits();
            println!(
                "{id}: {} (qps={}, max_records_per_query={}, lag={}s)",
                adapter.capability(),
                limits.qps,
                limits.max_records_per_query,
                limits.lag.num_seconds()
            );
        }
    }
}
