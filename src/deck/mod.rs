pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// A Deck board as returned by `GET boards/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Board {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    /// Version token; changes whenever the board or anything nested in it changes
    #[serde(default, rename = "ETag", alias = "etag")]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stack {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub cards: Option<Vec<Card>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duedate: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub assigned_users: Vec<AssignedUser>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub board_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AssignedUser {
    #[serde(default)]
    pub participant: Option<Participant>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Participant {
    #[serde(default)]
    pub displayname: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Label {
    #[serde(default)]
    pub title: Option<String>,
}

/// Read-only view of the board service. Failures abort the current poll
/// cycle; the caller retries on the next tick.
#[async_trait]
pub trait BoardSource: Send + Sync {
    async fn fetch_board(&self, board_id: i64) -> Result<Board>;

    /// Non-archived stacks of the board, in board order.
    async fn fetch_stacks(&self, board_id: i64) -> Result<Vec<Stack>>;

    /// Non-archived cards of one stack, sorted by ascending `order`.
    async fn fetch_cards(&self, board_id: i64, stack_id: i64) -> Result<Vec<Card>>;
}

pub fn active_stacks(stacks: Vec<Stack>) -> Vec<Stack> {
    stacks.into_iter().filter(|s| !s.archived).collect()
}

/// Drop archived cards and order the rest by `order`. The sort is stable,
/// so ties keep the order the API returned them in.
pub fn active_cards(cards: Vec<Card>) -> Vec<Card> {
    let mut cards: Vec<Card> = cards.into_iter().filter(|c| !c.archived).collect();
    cards.sort_by_key(|c| c.order);
    cards
}
