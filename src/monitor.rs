//! One poll cycle: fetch, gate on the ETag, render, batch, deliver.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::batch::{self, MessageGroup};
use crate::config::Config;
use crate::deck::{Board, BoardSource, Card, Stack};
use crate::detector::{Change, ChangeDetector};
use crate::platform::{Notifier, OutgoingMessage};
use crate::render::{self, RenderContext};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub board_id: i64,
    /// Nextcloud base URL used for card links
    pub base_url: String,
    /// Upper bound for a message body, in characters
    pub message_limit: usize,
    pub send_delay: Duration,
    pub check_interval: Duration,
    pub thread: Option<String>,
}

impl MonitorSettings {
    /// Settings for `config`. A configured message limit never exceeds the
    /// sink's own body limit.
    pub fn from_config(config: &Config, sink_limit: usize) -> Self {
        let thread = match (&config.discord, &config.telegram) {
            (_, Some(telegram)) => telegram.thread_id.clone(),
            (Some(discord), None) => discord.thread_id.clone(),
            (None, None) => None,
        };
        let message_limit = match config.monitor.message_limit {
            Some(limit) if limit > sink_limit => {
                warn!(
                    "monitor.message_limit {} exceeds the sink limit {}; using {}",
                    limit, sink_limit, sink_limit
                );
                sink_limit
            }
            Some(limit) => limit,
            None => sink_limit,
        };
        Self {
            board_id: config.deck.board_id,
            base_url: config.deck.url.clone(),
            message_limit,
            send_delay: config.monitor.send_delay(),
            check_interval: config.monitor.check_interval(),
            thread,
        }
    }
}

/// What a single poll cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fingerprint matched the last delivered one; nothing fetched beyond the board
    Unchanged,
    /// No stack had cards; the new state still counts as observed
    Empty,
    /// At least one message went out
    Delivered { sent: usize, failed: usize },
    /// Every message was rejected; the board will be re-sent next cycle
    Undelivered { failed: usize },
}

pub fn banner(board_title: &str, now: DateTime<Local>) -> String {
    format!(
        "**{}** - Updated {}",
        board_title,
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Mirrors a Deck board into a chat channel. Holds the only state that
/// outlives a cycle: the last delivered fingerprint.
pub struct Monitor<S, N> {
    source: S,
    notifier: N,
    detector: ChangeDetector,
    settings: MonitorSettings,
}

impl<S: BoardSource, N: Notifier> Monitor<S, N> {
    pub fn new(source: S, notifier: N, settings: MonitorSettings) -> Self {
        Self {
            source,
            notifier,
            detector: ChangeDetector::new(),
            settings,
        }
    }

    /// Run a single cycle. An `Err` means fetching failed and the cycle was
    /// aborted before anything was sent.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome> {
        let board = self.source.fetch_board(self.settings.board_id).await?;

        if self.detector.check(board.etag.as_deref()) == Change::Unchanged {
            debug!(
                "No updates found for board {} (ETag {:?})",
                board.id,
                self.detector.last()
            );
            return Ok(CycleOutcome::Unchanged);
        }

        info!("Board '{}' updated at {}", board.title, Local::now());

        let stacks = self.source.fetch_stacks(board.id).await?;
        let groups = self.build_groups(&board, stacks).await?;

        if groups.is_empty() {
            info!("Board '{}' has no cards to post", board.title);
            self.detector.commit(board.etag.as_deref());
            return Ok(CycleOutcome::Empty);
        }

        let (sent, failed) = self.deliver(&groups).await;
        info!(
            "Posted {} of {} message(s) to {}",
            sent,
            groups.len(),
            self.notifier.name()
        );

        if sent == 0 {
            warn!("Nothing was delivered; board '{}' will be re-sent", board.title);
            return Ok(CycleOutcome::Undelivered { failed });
        }

        self.detector.commit(board.etag.as_deref());
        Ok(CycleOutcome::Delivered { sent, failed })
    }

    /// Fetch, render and pack every stack. Card fetching happens up front so a
    /// failure aborts the cycle before the first message goes out.
    async fn build_groups(&self, board: &Board, stacks: Vec<Stack>) -> Result<Vec<MessageGroup>> {
        let ctx = RenderContext {
            base_url: self.settings.base_url.clone(),
            board_id: board.id,
        };

        let mut groups = Vec::new();
        for stack in stacks.into_iter().filter(|s| !s.archived) {
            let cards: Vec<Card> = self
                .source
                .fetch_cards(board.id, stack.id)
                .await?
                .into_iter()
                .filter(|c| !c.archived)
                .collect();

            if cards.is_empty() {
                debug!("Skipping empty stack '{}'", stack.title);
                continue;
            }

            let rendered = render::render_stack(&cards, &ctx);
            groups.extend(batch::pack_stack(
                &stack.title,
                rendered,
                self.settings.message_limit,
            ));
        }

        if let Some(first) = groups.first_mut() {
            first.banner = Some(banner(&board.title, Local::now()));
        }

        Ok(groups)
    }

    /// Send groups in order, pausing between them. Returns (sent, failed).
    async fn deliver(&self, groups: &[MessageGroup]) -> (usize, usize) {
        let mut sent = 0;
        let mut failed = 0;

        for (i, group) in groups.iter().enumerate() {
            let message = OutgoingMessage {
                title: &group.title,
                body: &group.body,
                banner: group.banner.as_deref(),
                thread: self.settings.thread.as_deref(),
            };

            match self.notifier.send(&message).await {
                Ok(()) => {
                    sent += 1;
                    info!(
                        "Posted '{}' ({} chars) to {}",
                        group.title,
                        group.body_len(),
                        self.notifier.name()
                    );
                }
                Err(e) => {
                    failed += 1;
                    error!(
                        "Failed to post '{}' to {}: {:#}",
                        group.title,
                        self.notifier.name(),
                        e
                    );
                }
            }

            if i + 1 < groups.len() {
                tokio::time::sleep(self.settings.send_delay).await;
            }
        }

        (sent, failed)
    }

    /// Poll until Ctrl-C. Cycle failures are logged and retried next tick.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Starting monitoring of board {} every {:?}",
            self.settings.board_id, self.settings.check_interval
        );

        loop {
            match self.poll_once().await {
                Ok(CycleOutcome::Delivered { sent, failed }) => {
                    info!("Cycle complete: {} sent, {} failed", sent, failed)
                }
                Ok(CycleOutcome::Undelivered { failed }) => {
                    warn!("Cycle undelivered: all {} message(s) failed", failed)
                }
                Ok(CycleOutcome::Empty) | Ok(CycleOutcome::Unchanged) => {}
                Err(e) => error!("Failed to refresh board: {:#}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.check_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, stopping monitor");
                    return Ok(());
                }
            }
        }
    }
}
