use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{active_cards, active_stacks, Board, BoardSource, Card, Stack};
use crate::config::{DeckConfig, HttpConfig};

const API_PATH: &str = "index.php/apps/deck/api/v1.0";

/// Statuses worth another attempt: rate limiting and transient server errors.
fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Nextcloud Deck REST client with basic auth and bounded retries.
pub struct DeckClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    max_retries: u32,
    backoff: Duration,
}

impl DeckClient {
    pub fn new(deck: &DeckConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: deck.url.trim_end_matches('/').to_string(),
            username: deck.username.clone(),
            password: deck.password.clone(),
            max_retries: http.max_retries,
            backoff: Duration::from_millis(http.backoff_ms),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PATH, endpoint)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.api_url(endpoint);
        let mut attempt: u32 = 0;

        loop {
            debug!("GET {} (attempt {})", url, attempt + 1);

            let result = self
                .client
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .header("OCS-APIRequest", "true")
                .header("Content-Type", "application/json")
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("Failed to parse Deck response from {}", url));
                    }
                    if !is_retryable(status) || attempt >= self.max_retries {
                        let body = response.text().await.unwrap_or_default();
                        anyhow::bail!("Deck API error ({}) for {}: {}", status, url, body);
                    }
                    warn!("Deck API returned {} for {}, retrying", status, url);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(e).with_context(|| format!("Deck request failed: {}", url));
                    }
                    warn!("Deck request to {} failed ({}), retrying", url, e);
                }
            }

            tokio::time::sleep(self.backoff * 2u32.saturating_pow(attempt)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl BoardSource for DeckClient {
    async fn fetch_board(&self, board_id: i64) -> Result<Board> {
        self.get(&format!("boards/{}", board_id))
            .await
            .with_context(|| format!("Failed to fetch board {}", board_id))
    }

    async fn fetch_stacks(&self, board_id: i64) -> Result<Vec<Stack>> {
        let stacks: Vec<Stack> = self
            .get(&format!("boards/{}/stacks", board_id))
            .await
            .with_context(|| format!("Failed to fetch stacks of board {}", board_id))?;
        Ok(active_stacks(stacks))
    }

    async fn fetch_cards(&self, board_id: i64, stack_id: i64) -> Result<Vec<Card>> {
        let stack: Stack = self
            .get(&format!("boards/{}/stacks/{}", board_id, stack_id))
            .await
            .with_context(|| format!("Failed to fetch cards of stack {}", stack_id))?;
        Ok(active_cards(stack.cards.unwrap_or_default()))
    }
}
