use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;

use vidra::core::config;
use vidra::download::cleanup::{spawn_cleanup_scheduler, RetentionPolicy};
use vidra::download::{DownloadOrchestrator, VideoCatalog, YtDlpFetcher};
use vidra::storage::create_pool;
use vidra::telegram::{create_bot, schema, HandlerDeps, SubscriptionGate};

/// Main entry point for the Telegram bot
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    pretty_env_logger::init();

    log::info!("Starting vidra...");

    // Download root must exist before the first attempt directory is created
    std::fs::create_dir_all(config::DOWNLOAD_FOLDER.as_str())?;

    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);
    log::info!("Database ready at {}", *config::DATABASE_PATH);

    let fetcher = Arc::new(YtDlpFetcher::new());
    let catalog = Arc::new(VideoCatalog::new(fetcher.clone(), db_pool.clone()));
    let orchestrator = Arc::new(DownloadOrchestrator::new(fetcher, db_pool.clone()));
    let gate = Arc::new(SubscriptionGate::new());

    // Retention runs independently of inbound traffic for the whole
    // process lifetime
    let _cleanup_task = spawn_cleanup_scheduler(db_pool.clone(), RetentionPolicy::default());

    let bot = create_bot()?;
    let deps = HandlerDeps {
        db_pool,
        catalog,
        orchestrator,
        gate,
    };

    log::info!("Bot dispatcher starting");
    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Bot stopped");
    Ok(())
}
