//! Turns a single Deck card into a self-contained, numbered text fragment.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::{error, warn};

use crate::deck::Card;

const NOTE_MAX_CHARS: usize = 100;
const MARKER: &str = "└";

static LINK_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)\([^)]*\)").expect("Invalid regex"));
static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("Invalid regex"));
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*~^]").expect("Invalid regex"));

/// Where card links point to.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Nextcloud base URL, without trailing slash
    pub base_url: String,
    /// Board used for cards that don't carry their own `boardId`
    pub board_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    MissingField(&'static str),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::MissingField(field) => write!(f, "card has no {}", field),
        }
    }
}

impl std::error::Error for RenderError {}

impl RenderContext {
    pub fn card_url(&self, card: &Card) -> String {
        let board_id = card.board_id.unwrap_or(self.board_id);
        format!(
            "{}/apps/deck/#/board/{}/card/{}",
            self.base_url, board_id, card.id
        )
    }
}

/// Render `card` at 1-based `position`:
/// `"{n}. [{title}]({url})"` followed by note, due date, assignees and labels.
pub fn render_card(card: &Card, position: usize, ctx: &RenderContext) -> Result<String, RenderError> {
    let title = card
        .title
        .as_deref()
        .ok_or(RenderError::MissingField("title"))?;

    let mut desc = format!("{}. [{}]({})", position, title, ctx.card_url(card));

    if let Some(note) = card.description.as_deref().and_then(note_line) {
        desc.push_str(&format!("\n{} {}", MARKER, note));
    }

    if let Some(raw) = card.duedate.as_deref().filter(|d| !d.trim().is_empty()) {
        match parse_due_date(raw) {
            Some(date) => desc.push_str(&format!("\n{} Due: {}", MARKER, date.format("%Y-%m-%d"))),
            None => warn!("Invalid date format for card {}: {}", card.id, raw),
        }
    }

    let users: Vec<String> = card
        .assigned_users
        .iter()
        .filter_map(|u| u.participant.as_ref()?.displayname.as_deref())
        .map(|name| format!("@{}", name))
        .collect();
    if !users.is_empty() {
        desc.push_str(&format!("\n{} Assigned: {}", MARKER, users.join(", ")));
    }

    let labels: Vec<String> = card
        .labels
        .iter()
        .filter_map(|l| l.title.as_deref())
        .map(|t| format!("[{}]", t))
        .collect();
    if !labels.is_empty() {
        desc.push_str(&format!("\n{} {}", MARKER, labels.join(" ")));
    }

    Ok(desc)
}

/// Like [`render_card`], but a broken card becomes a one-line placeholder so
/// its siblings still render.
pub fn render_or_placeholder(card: &Card, position: usize, ctx: &RenderContext) -> String {
    match render_card(card, position, ctx) {
        Ok(text) => text,
        Err(e) => {
            error!("Error rendering card {}: {}", card.id, e);
            format!("{}. [Error loading card]", position)
        }
    }
}

/// Render every card of a stack in the given order, numbering from 1.
pub fn render_stack(cards: &[Card], ctx: &RenderContext) -> Vec<String> {
    cards
        .iter()
        .enumerate()
        .map(|(i, card)| render_or_placeholder(card, i + 1, ctx))
        .collect()
}

/// Remove markdown link targets, brackets and emphasis markers.
pub fn strip_markdown(text: &str) -> String {
    let text = LINK_TARGET_RE.replace_all(text, "$1");
    let text = BRACKET_RE.replace_all(&text, "$1");
    EMPHASIS_RE.replace_all(&text, "").into_owned()
}

/// First non-empty line of a description, cleaned and capped at
/// `NOTE_MAX_CHARS` (the ellipsis counts towards the cap).
fn note_line(description: &str) -> Option<String> {
    let line = description.lines().map(str::trim).find(|l| !l.is_empty())?;
    let cleaned = strip_markdown(line);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() > NOTE_MAX_CHARS {
        let head: String = cleaned.chars().take(NOTE_MAX_CHARS - 1).collect();
        Some(format!("{}…", head.trim_end()))
    } else {
        Some(cleaned.to_string())
    }
}

/// Accepts RFC 3339 as well as the zone-less and date-only ISO 8601 forms.
fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
