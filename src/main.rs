//! Movie Code Bot - Main Entry Point
//!
//! A Telegram bot that sends catalog movies by numeric code to users who
//! have joined the required channels.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use movie_code_bot::broadcast::{AdScheduler, SchedulerMessage};
use movie_code_bot::commands::BotHandler;
use movie_code_bot::config::{BotConfig, TelegramConfig};
use movie_code_bot::storage::Database;
use movie_code_bot::telegram::{Messenger, TelegramMessenger, incoming_callback, incoming_message};

/// Telegram bot that serves movies by code.
#[derive(Parser, Debug)]
#[command(name = "movie_bot")]
#[command(about = "Serve catalog movies by numeric code behind a channel subscription gate")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// SQLite database file (overrides DATABASE_PATH).
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let mut bot_config =
        BotConfig::from_env().context("Failed to load bot configuration from environment")?;
    if let Some(path) = args.database {
        bot_config.database_path = path;
    }

    let db = Database::open(&bot_config.database_path).with_context(|| {
        format!(
            "Failed to open database {}",
            bot_config.database_path.display()
        )
    })?;
    if db
        .add_admin(bot_config.main_admin)
        .context("Failed to seed the main admin")?
    {
        info!(target: "audit", "Main admin {} seeded", bot_config.main_admin);
    }
    info!(
        "Database ready at {} (main admin: {})",
        bot_config.database_path.display(),
        bot_config.main_admin
    );

    // Connect to Telegram
    let telegram = TelegramMessenger::from_config(&tg_config);
    let bot = telegram.bot().clone();
    let me = bot
        .get_me()
        .await
        .context("Failed to reach the Bot API, check BOT_TOKEN")?;
    info!(
        "Logged in as @{}",
        me.user.username.as_deref().unwrap_or("<no username>")
    );
    let messenger: Arc<dyn Messenger> = Arc::new(telegram);

    // Create scheduler channel
    let (scheduler_tx, scheduler_rx) = mpsc::channel::<SchedulerMessage>(32);

    let handler = Arc::new(
        BotHandler::new(db.clone(), Arc::clone(&messenger), bot_config.clone())
            .with_scheduler(scheduler_tx.clone()),
    );

    // Create scheduler
    let scheduler = AdScheduler::new(
        db,
        handler.fan_out(),
        Arc::clone(&messenger),
        bot_config.main_admin,
    )
    .with_check_interval(bot_config.ad_check_interval());
    let scheduler_stop = scheduler.stop_flag();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    let purge_handle = tokio::spawn(purge_sessions(
        Arc::clone(&handler),
        bot_config.session_ttl(),
    ));

    info!("Starting movie bot...");

    let tree = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    Dispatcher::builder(bot, tree)
        .dependencies(dptree::deps![Arc::clone(&handler)])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Cleanup
    info!("Shutting down...");
    scheduler_stop.cancel();
    purge_handle.abort();
    if scheduler_tx.send(SchedulerMessage::Shutdown).await.is_err() {
        warn!("Ad scheduler already stopped");
    }
    if let Err(e) = scheduler_handle.await {
        error!("Ad scheduler task failed: {}", e);
    }

    Ok(())
}

async fn on_message(msg: Message, handler: Arc<BotHandler>) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(incoming) = incoming_message(&msg) else {
        return Ok(());
    };

    let user_id = incoming.sender.id;
    if let Err(e) = handler.handle_message(incoming).await {
        error!("Failed to handle message from {}: {}", user_id, e);
    }
    Ok(())
}

async fn on_callback(query: CallbackQuery, handler: Arc<BotHandler>) -> ResponseResult<()> {
    let Some(incoming) = incoming_callback(&query) else {
        return Ok(());
    };

    let user_id = incoming.sender.id;
    if let Err(e) = handler.handle_callback(incoming).await {
        error!("Failed to handle callback from {}: {}", user_id, e);
    }
    Ok(())
}

/// Periodically forgets expired conversations.
async fn purge_sessions(handler: Arc<BotHandler>, ttl: Duration) {
    let mut timer = tokio::time::interval(ttl.max(Duration::from_secs(60)));
    loop {
        timer.tick().await;
        let purged = handler.sessions().purge_expired().await;
        if purged > 0 {
            debug!("Purged {} expired session(s)", purged);
        }
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
