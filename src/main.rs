mod batch;
mod config;
mod deck;
mod detector;
mod monitor;
mod platform;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Platform};
use crate::deck::client::DeckClient;
use crate::monitor::{Monitor, MonitorSettings};
use crate::platform::discord::DiscordNotifier;
use crate::platform::telegram::TelegramNotifier;
use crate::platform::Notifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,deckwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Deck: {}", config.deck.url);
    info!("  Board: {}", config.deck.board_id);
    info!("  Platform: {}", config.platform());
    info!("  Check interval: {}s", config.monitor.check_interval_secs);

    let source = DeckClient::new(&config.deck, &config.http)?;
    let timeout = Duration::from_secs(config.http.timeout_secs);

    match (config.platform(), &config.discord, &config.telegram) {
        (Platform::Telegram, _, Some(telegram)) => {
            run(&config, source, TelegramNotifier::new(telegram)).await
        }
        (Platform::Discord, Some(discord), _) => {
            run(&config, source, DiscordNotifier::new(discord, timeout)?).await
        }
        _ => anyhow::bail!("No notification sink configured"),
    }
}

async fn run<N: Notifier>(config: &Config, source: DeckClient, notifier: N) -> Result<()> {
    let settings = MonitorSettings::from_config(config, notifier.max_body_len());
    info!(
        "  Message limit: {} chars ({})",
        settings.message_limit,
        notifier.name()
    );

    Monitor::new(source, notifier, settings).run().await
}
