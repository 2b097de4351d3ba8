use anyhow::{Context, Result};
use services::{
    catalog_service::CatalogReader, dir_store::DirStore, existence_oracle::ExistenceOracle,
    local_resolver::LocalResolver, migration_driver::MigrationDriver, object_store::ObjectStore,
    preflight, s3_store::S3Store, transfer_worker::TransferWorker,
};
use sqlx::any::AnyPoolOptions;
use std::{process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod services;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup (stdout is reserved for the summary) ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        media_root = %cfg.media_root.display(),
        bucket = %cfg.bucket,
        key_prefix = %cfg.key_prefix,
        concurrency = cfg.concurrency,
        max_attempts = cfg.retry.max_attempts,
        "starting media migration"
    );

    // --- Catalog connection ---
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(cfg.pool_size())
        .connect(&cfg.database_url)
        .await
        .context("connecting to the catalog database")?;

    // --- Bucket client ---
    let store: Arc<dyn ObjectStore> = match &cfg.bucket_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "using directory-backed bucket");
            Arc::new(DirStore::new(dir))
        }
        None => Arc::new(S3Store::connect(cfg.load_credentials()?).await),
    };

    if mode.check {
        let report = preflight::run(&pool, &cfg.media_root, store.as_ref(), &cfg.bucket).await;
        if mode.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{report}");
        }
        return Ok(if report.is_ok() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let resolver = LocalResolver::new(&cfg.media_root)
        .with_context(|| format!("opening media root {}", cfg.media_root.display()))?;

    // --- Interrupt handling: stop admitting work, drain in-flight slots ---
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing in-flight transfers");
                cancel.cancel();
            }
        });
    }

    let driver = MigrationDriver::new(
        resolver,
        ExistenceOracle::new(store.clone()),
        TransferWorker::new(store, cancel.clone()),
        cfg.bucket.clone(),
        cfg.key_prefix.clone(),
        cfg.concurrency,
        cfg.retry,
        cancel,
    );

    let catalog = CatalogReader::new(pool.clone(), cfg.catalog_query.clone());
    let report = driver
        .run(catalog.records())
        .await
        .context("catalog query failed; run aborted")?;
    pool.close().await;

    if mode.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    Ok(report.exit_code())
}
