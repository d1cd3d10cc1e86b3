use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Platform {
    Discord,
    Telegram,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Discord => write!(f, "discord"),
            Platform::Telegram => write!(f, "telegram"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub deck: DeckConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

/// Nextcloud Deck connection settings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeckConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub board_id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Pause between two outbound messages of the same cycle
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,
    /// Overrides the sink's own per-message body limit
    #[serde(default)]
    pub message_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiscordConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: i64,
    /// Forum topic the updates are posted into
    #[serde(default)]
    pub thread_id: Option<String>,
}

fn default_check_interval() -> u64 {
    60
}

fn default_send_delay() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff() -> u64 {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            send_delay_ms: default_send_delay(),
            message_limit: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff(),
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

impl Config {
    /// Load the TOML file at `path` (if present), overlay environment
    /// variables, then validate. Any error here is fatal at startup.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay values from the environment. `lookup` is injected so tests
    /// don't have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("NEXTCLOUD_URL") {
            self.deck.url = url;
        }
        if let Some(username) = get("NEXTCLOUD_USERNAME") {
            self.deck.username = username;
        }
        if let Some(password) = get("NEXTCLOUD_PASSWORD") {
            self.deck.password = password;
        }
        if let Some(board_id) = get("BOARD_ID").and_then(|v| v.trim().parse().ok()) {
            self.deck.board_id = board_id;
        }
        if let Some(interval) = get("CHECK_INTERVAL").and_then(|v| v.trim().parse().ok()) {
            self.monitor.check_interval_secs = interval;
        }

        if let Some(webhook_url) = get("DISCORD_WEBHOOK_URL") {
            self.discord.get_or_insert_with(Default::default).webhook_url = webhook_url;
        }
        if let Some(thread_id) = get("DISCORD_THREAD_ID") {
            self.discord.get_or_insert_with(Default::default).thread_id = Some(thread_id);
        }

        if let Some(bot_token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.get_or_insert_with(Default::default).bot_token = bot_token;
        }
        if let Some(chat_id) = get("TELEGRAM_CHAT_ID").and_then(|v| v.trim().parse().ok()) {
            self.telegram.get_or_insert_with(Default::default).chat_id = chat_id;
        }
        if let Some(thread_id) = get("TELEGRAM_THREAD_ID") {
            self.telegram.get_or_insert_with(Default::default).thread_id = Some(thread_id);
        }
    }

    pub fn validate(&mut self) -> Result<()> {
        let mut missing = Vec::new();
        if self.deck.url.trim().is_empty() {
            missing.push("deck.url (NEXTCLOUD_URL)");
        }
        if self.deck.username.is_empty() {
            missing.push("deck.username (NEXTCLOUD_USERNAME)");
        }
        if self.deck.password.is_empty() {
            missing.push("deck.password (NEXTCLOUD_PASSWORD)");
        }
        if self.deck.board_id == 0 {
            missing.push("deck.board_id (BOARD_ID)");
        }
        if !missing.is_empty() {
            anyhow::bail!("Missing required settings: {}", missing.join(", "));
        }

        self.deck.url = self.deck.url.trim().trim_end_matches('/').to_string();

        if self.monitor.check_interval_secs == 0 {
            anyhow::bail!("monitor.check_interval_secs must be greater than zero");
        }
        if self.monitor.message_limit == Some(0) {
            anyhow::bail!("monitor.message_limit must be greater than zero");
        }

        match (&self.discord, &self.telegram) {
            (Some(discord), None) => {
                if discord.webhook_url.trim().is_empty() {
                    anyhow::bail!("discord.webhook_url (DISCORD_WEBHOOK_URL) is required");
                }
                if let Some(thread_id) = &discord.thread_id {
                    thread_id.trim().parse::<u64>().with_context(|| {
                        format!("discord.thread_id (DISCORD_THREAD_ID) is not a thread id: {}", thread_id)
                    })?;
                }
            }
            (None, Some(telegram)) => {
                if telegram.bot_token.trim().is_empty() {
                    anyhow::bail!("telegram.bot_token (TELEGRAM_BOT_TOKEN) is required");
                }
                if telegram.chat_id == 0 {
                    anyhow::bail!("telegram.chat_id (TELEGRAM_CHAT_ID) is required");
                }
                if let Some(thread_id) = &telegram.thread_id {
                    thread_id.trim().parse::<i32>().with_context(|| {
                        format!("telegram.thread_id (TELEGRAM_THREAD_ID) is not a topic id: {}", thread_id)
                    })?;
                }
            }
            (Some(_), Some(_)) => {
                anyhow::bail!("Configure either [discord] or [telegram], not both")
            }
            (None, None) => {
                anyhow::bail!("No notification sink configured: add [discord] or [telegram]")
            }
        }

        Ok(())
    }

    /// The configured sink. Only meaningful after `validate` succeeded.
    pub fn platform(&self) -> Platform {
        if self.telegram.is_some() {
            Platform::Telegram
        } else {
            Platform::Discord
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
[deck]
url = "https://cloud.example.com/"
username = "bot"
password = "secret"
board_id = 7

[monitor]
check_interval_secs = 30
send_delay_ms = 250

[discord]
webhook_url = "https://discord.example.com/api/webhooks/1/abc"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_full_file() {
        let mut config = Config::parse(FULL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.deck.url, "https://cloud.example.com");
        assert_eq!(config.deck.board_id, 7);
        assert_eq!(config.monitor.check_interval_secs, 30);
        assert_eq!(config.monitor.send_delay_ms, 250);
        assert_eq!(config.monitor.message_limit, None);
        assert_eq!(config.http.max_retries, 3);
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.platform(), Platform::Discord);
    }

    #[test]
    fn test_env_only_configuration() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("NEXTCLOUD_URL", "https://nc.example.org"),
            ("NEXTCLOUD_USERNAME", "alice"),
            ("NEXTCLOUD_PASSWORD", "pw"),
            ("BOARD_ID", "3"),
            ("CHECK_INTERVAL", "15"),
            ("DISCORD_WEBHOOK_URL", "https://discord.example.com/hook"),
            ("DISCORD_THREAD_ID", "998877"),
        ]));
        config.validate().unwrap();
        assert_eq!(config.deck.username, "alice");
        assert_eq!(config.deck.board_id, 3);
        assert_eq!(config.monitor.check_interval_secs, 15);
        let discord = config.discord.as_ref().unwrap();
        assert_eq!(discord.thread_id.as_deref(), Some("998877"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::parse(FULL).unwrap();
        config.apply_env(env(&[("BOARD_ID", "99"), ("NEXTCLOUD_PASSWORD", "")]));
        config.validate().unwrap();
        assert_eq!(config.deck.board_id, 99);
        // Empty variables do not clobber file values
        assert_eq!(config.deck.password, "secret");
    }

    #[test]
    fn test_missing_required_settings_fail() {
        let mut config = Config::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("NEXTCLOUD_URL"));
        assert!(err.contains("BOARD_ID"));
    }

    #[test]
    fn test_missing_sink_fails() {
        let mut config = Config::parse(FULL).unwrap();
        config.discord = None;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("No notification sink"));
    }

    #[test]
    fn test_two_sinks_rejected() {
        let mut config = Config::parse(FULL).unwrap();
        config.telegram = Some(TelegramConfig {
            bot_token: "t".to_string(),
            chat_id: 1,
            thread_id: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telegram_sink() {
        let mut config = Config::parse(
            r#"
[deck]
url = "https://cloud.example.com"
username = "bot"
password = "secret"
board_id = 7

[telegram]
bot_token = "123:abc"
chat_id = -100200300
thread_id = "42"
"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.platform(), Platform::Telegram);
        assert_eq!(config.telegram.as_ref().unwrap().chat_id, -100200300);
    }

    #[test]
    fn test_non_numeric_telegram_thread_rejected() {
        let mut config = Config::parse(FULL).unwrap();
        config.discord = None;
        config.apply_env(env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100200300"),
            ("TELEGRAM_THREAD_ID", "general"),
        ]));
        let err = format!("{:#}", config.validate().unwrap_err());
        assert!(err.contains("TELEGRAM_THREAD_ID"));

        config.telegram.as_mut().unwrap().thread_id = Some(" 42 ".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_non_numeric_discord_thread_rejected() {
        let mut config = Config::parse(FULL).unwrap();
        config.discord.as_mut().unwrap().thread_id = Some("updates".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::parse(FULL).unwrap();
        config.monitor.check_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
