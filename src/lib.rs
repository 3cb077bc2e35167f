pub mod cli;
pub mod clients;
pub mod config;
pub mod coordinator;
pub mod diff;
pub mod models;
pub mod resolve;
pub mod services;
pub mod sources;
pub mod store;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use clients::{AnitabiClient, BarkNotifier};
pub use config::Config;
use coordinator::{AcquireError, Coordinator, Role};
use services::{DailyUpdateService, ImageService, MonthlyUpdateService};
use sources::ScrapeFeedSource;
use store::Store;

pub async fn run() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Daily { max_anime, feed }) => daily(&config, max_anime, feed).await,
        Some(Commands::Monthly {
            start_id,
            end_id,
            concurrency,
        }) => monthly(&config, start_id, end_id, concurrency).await,
        Some(Commands::Reindex) => reindex(&config),
        Some(Commands::Init) => init(),
        None => {
            // Historically the bare invocation was the daily cron entrypoint.
            daily(&config, None, None).await
        }
    }
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(
        Path::new(&config.store.data_root),
        Path::new(&config.store.root_dir),
        &config.mirror.base_url,
    )
}

fn coordinator(config: &Config, role: Role) -> Coordinator {
    let (own, peer) = match role {
        Role::Daily => (&config.locks.daily_path, &config.locks.monthly_path),
        Role::Monthly => (&config.locks.monthly_path, &config.locks.daily_path),
    };
    Coordinator::new(
        role,
        Path::new(own),
        Path::new(peer),
        config.locks.wait(),
        config.locks.max_wait_attempts,
        config.locks.extended_wait(),
    )
}

async fn daily(config: &Config, max_anime: Option<usize>, feed: Option<String>) -> Result<()> {
    let notifier = BarkNotifier::new(&config.bark.url, config.bark.enabled);

    let lock = match coordinator(config, Role::Daily).acquire().await {
        Ok(lock) => lock,
        Err(AcquireError::AlreadyRunning { .. }) => {
            // A concurrent run of the same role is a normal skip.
            return Ok(());
        }
        Err(e) => {
            notifier
                .notify("Pilgrimage daily update failed", &e.to_string())
                .await;
            return Err(e.into());
        }
    };

    let feed_path = feed.unwrap_or_else(|| config.scrape.feed_path.clone());
    let limit = max_anime.unwrap_or(config.scrape.max_anime);

    let result = run_daily(config, Path::new(&feed_path), limit).await;
    lock.release();

    match result {
        Ok(summary) => {
            info!("{summary}");
            notifier.notify("Pilgrimage daily update", &summary).await;
            Ok(())
        }
        Err(e) => {
            notifier
                .notify("Pilgrimage daily update failed", &format!("{e:#}"))
                .await;
            Err(e)
        }
    }
}

async fn run_daily(config: &Config, feed_path: &Path, limit: usize) -> Result<String> {
    let store = open_store(config)?;
    let source = ScrapeFeedSource::load(feed_path)?;
    let images = ImageService::new(store.clone());

    let service = DailyUpdateService::new(source, store, images);
    let outcome = service.run(limit).await?;

    if !outcome.changed() {
        warn!("No changes this run");
    }
    Ok(outcome.summary_message())
}

async fn monthly(
    config: &Config,
    start_id: Option<i64>,
    end_id: Option<i64>,
    concurrency: Option<usize>,
) -> Result<()> {
    let notifier = BarkNotifier::new(&config.bark.url, config.bark.enabled);

    let lock = match coordinator(config, Role::Monthly).acquire().await {
        Ok(lock) => lock,
        Err(AcquireError::AlreadyRunning { .. }) => {
            return Ok(());
        }
        Err(e) => {
            notifier
                .notify("Pilgrimage monthly scan failed", &e.to_string())
                .await;
            return Err(e.into());
        }
    };

    let result = run_monthly(config, start_id, end_id, concurrency).await;
    lock.release();

    match result {
        Ok(summary) => {
            info!("{summary}");
            notifier.notify("Pilgrimage monthly scan", &summary).await;
            Ok(())
        }
        Err(e) => {
            notifier
                .notify("Pilgrimage monthly scan failed", &format!("{e:#}"))
                .await;
            Err(e)
        }
    }
}

async fn run_monthly(
    config: &Config,
    start_id: Option<i64>,
    end_id: Option<i64>,
    concurrency: Option<usize>,
) -> Result<String> {
    let store = open_store(config)?;
    let client = AnitabiClient::new(&config.api.base_url)?;
    let images = ImageService::new(store.clone());
    let report_path = PathBuf::from(&config.store.root_dir).join("valid_api_ids.json");

    let service = MonthlyUpdateService::new(
        client,
        store,
        images,
        concurrency.unwrap_or(config.api.concurrency),
        report_path,
    );
    let outcome = service
        .run(
            start_id.unwrap_or(config.api.start_id),
            end_id.unwrap_or(config.api.end_id),
        )
        .await?;

    Ok(outcome.summary_message())
}

fn reindex(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let index = store.regenerate_index()?;
    info!(entries = index.len(), "Index rebuilt");
    Ok(())
}

fn init() -> Result<()> {
    if !Config::create_default_if_missing()? {
        info!("Config file already exists, leaving it alone");
    }
    Ok(())
}
