mod campaign_commands;
mod db_commands;

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    votegate_campaigns::{CampaignEngine, store_sqlite::SqliteCampaignStore},
    votegate_config::VoteGateConfig,
    votegate_telegram::{TelegramBotConfig, TelegramMembership, TelegramPublisher},
};

#[derive(Parser)]
#[command(name = "votegate", about = "votegate: subscribers-only votes for Telegram channels")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./votegate.toml and the user config dir).
    #[arg(long, global = true, env = "VOTEGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the bot (default when no subcommand is provided).
    Run,
    /// Print a stored campaign and its rendered tally.
    Show {
        /// Campaign id from a share link.
        id: String,
    },
    /// Run all pending database migrations.
    Migrate,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// The `telegram` config section; absent means all defaults.
fn telegram_config(config: &VoteGateConfig) -> anyhow::Result<TelegramBotConfig> {
    if config.telegram.is_null() {
        return Ok(TelegramBotConfig::default());
    }
    Ok(serde_json::from_value(config.telegram.clone())?)
}

async fn run_bot(config: VoteGateConfig) -> anyhow::Result<()> {
    let tg_config = telegram_config(&config)?;
    let bot = votegate_telegram::build_bot(&tg_config)?;
    let me = votegate_telegram::connect(&bot).await?;

    let pool = db_commands::open_database(&config.database.url).await?;
    let membership = Arc::new(TelegramMembership::new(bot.clone(), me.user.id));
    let engine = CampaignEngine::new(
        Arc::new(SqliteCampaignStore::with_pool(pool)),
        Arc::<TelegramMembership>::clone(&membership),
        membership,
        Arc::new(TelegramPublisher::new(bot.clone())),
    )
    .with_membership_timeout(Duration::from_secs(
        config.campaigns.membership_timeout_secs,
    ));

    let cancel = votegate_telegram::start_polling(bot, &me, tg_config, Arc::new(engine));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown requested");
        },
        () = cancel.cancelled() => {
            warn!("telegram polling stopped");
        },
    }
    cancel.cancel();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "votegate starting");

    let config = votegate_config::load(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::Run) => run_bot(config).await,
        Some(Commands::Show { id }) => campaign_commands::show(&config.database.url, &id).await,
        Some(Commands::Migrate) => db_commands::migrate(&config.database.url).await,
    }
}
