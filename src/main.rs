//! # Herald
//!
//! Chat bot with predicate-routed handlers and durable reminders.
//!
//! Usage:
//!   herald                          # Run against the console transport
//!   herald --config ./herald.toml   # Custom config file
//!   herald --check-config           # Validate config and exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use herald_bot::storage::{FileBotStorage, SqliteBotStorage};
use herald_bot::{Bot, MultiplexStorage, builtin};
use herald_channels::ConsoleTransport;
use herald_channels::console::{DEFAULT_OPERATOR, DEFAULT_ROOM};
use herald_core::config::{HeraldConfig, LogConfig, LogFormat};
use herald_core::shutdown;
use herald_core::traits::{BotStorage, Transport};
use herald_core::types::{RoomId, UserId};
use herald_scheduler::{Scheduler, SqliteTaskStore, TaskStore, commands};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "herald", version, about = "🗓️ Herald: chat bot with durable reminders")]
struct Cli {
    /// Config file (default: ~/.herald/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override storage.data_dir
    #[arg(long)]
    data_dir: Option<String>,

    /// Console user that typed lines are sent as
    #[arg(long, default_value = DEFAULT_OPERATOR)]
    operator: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Load and validate the config, print a summary and exit
    #[arg(long)]
    check_config: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn init_logging(log: &LogConfig, verbose: bool) {
    let filter = if verbose || log.debug {
        "herald=debug,herald_bot=debug,herald_scheduler=debug,herald_channels=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    // stdout belongs to the console transport
    match log.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn load_config(cli: &Cli) -> Result<HeraldConfig> {
    let mut config = match &cli.config {
        Some(path) => HeraldConfig::load_from(&expand_path(path))?,
        None => HeraldConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config.resolve()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).context("invalid configuration")?;
    init_logging(&config.log, cli.verbose);

    if cli.check_config {
        println!("✅ Configuration OK");
        println!("   User:      {}", config.bot.user_id);
        println!("   Data dir:  {}", config.storage.data_path().display());
        println!("   Time zone: {}", config.scheduler.timezone);
        println!(
            "   Outbound:  {} slots, {}ms rate-limit backoff",
            config.outbound.capacity, config.outbound.rate_limit_backoff_ms
        );
        return Ok(());
    }

    let started = Utc::now();
    std::fs::create_dir_all(config.storage.data_path())?;
    let database = config.storage.database_path();

    let backends: Vec<Arc<dyn BotStorage>> = vec![
        Arc::new(SqliteBotStorage::open(&database)?),
        Arc::new(FileBotStorage::open(&config.storage.state_file_path())?),
    ];
    let storage: Arc<dyn BotStorage> = Arc::new(MultiplexStorage::new(backends)?);
    let transport: Arc<dyn Transport> = Arc::new(ConsoleTransport::stdio(
        UserId::from(cli.operator.as_str()),
        RoomId::from(DEFAULT_ROOM),
    ));

    let mut bot = Bot::new(transport, storage, &config);
    let session = bot
        .authenticate(&config.bot.user_id, &config.bot.password)
        .await
        .context("login failed")?;
    tracing::info!("🔑 Logged in as {} ({})", session.user_id, session.device_id);

    builtin::register(&mut bot, started)?;
    let tasks: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::open(&database)?);
    let scheduler = Arc::new(Scheduler::new(tasks, bot.client(), &config.scheduler)?);
    commands::register(&mut bot, scheduler.clone())?;

    let (trigger, shutdown) = shutdown::channel();
    let scheduler_task = scheduler.start(shutdown.clone())?;

    let run = bot.run(shutdown);
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("🛑 Interrupted, shutting down");
            trigger.trigger();
            run.await
        }
    };

    trigger.trigger();
    if let Err(e) = scheduler_task.await {
        tracing::warn!("⚠️ Scheduler task ended abnormally: {e}");
    }
    result?;
    tracing::info!("👋 Bye");
    Ok(())
}
