use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Notifier, OutgoingMessage};
use crate::config::DiscordConfig;

/// Discord's cap on an embed description.
pub const MAX_EMBED_DESCRIPTION: usize = 4096;

const EMBED_COLOR: u32 = 0x03b2f8;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: Vec<Embed<'a>>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
}

/// Posts one embed per message through a Discord webhook.
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    fn max_body_len(&self) -> usize {
        MAX_EMBED_DESCRIPTION
    }

    async fn send(&self, message: &OutgoingMessage<'_>) -> Result<()> {
        let payload = WebhookPayload {
            content: message.banner,
            embeds: vec![Embed {
                title: message.title,
                description: message.body,
                color: EMBED_COLOR,
            }],
        };

        let mut query = vec![("wait", "true")];
        if let Some(thread) = message.thread {
            query.push(("thread_id", thread));
        }

        debug!("Posting '{}' to Discord webhook", message.title);

        let response = self
            .client
            .post(&self.webhook_url)
            .query(&query)
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to Discord")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord webhook error ({}): {}", status, error_body);
        }

        Ok(())
    }
}
