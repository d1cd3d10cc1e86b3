use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ThreadId};
use tracing::debug;

use super::{Notifier, OutgoingMessage};
use crate::config::TelegramConfig;

/// Telegram's hard limit for a text message, counted after HTML entities
/// are parsed. Telegram counts UTF-16 code units while batching counts
/// chars, so characters outside the BMP (most emoji) weigh double here.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Room kept free for the banner and title lines in front of the body.
const TITLE_RESERVE: usize = 256;

/// Visible chars allowed for each of the banner and the title.
const HEADER_LINE_MAX: usize = 120;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]\n]*)\]\((https?://[^)\s]+)\)").expect("Invalid regex")
});
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("Invalid regex"));

/// Posts board updates to a Telegram chat, optionally into a forum topic.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            chat_id: ChatId(config.chat_id),
        }
    }

    async fn send_html(&self, text: String, thread: Option<ThreadId>) -> Result<()> {
        let mut request = self
            .bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html);
        if let Some(thread) = thread {
            request = request.message_thread_id(thread);
        }
        request
            .await
            .with_context(|| format!("Failed to send Telegram message to {}", self.chat_id))?;
        Ok(())
    }
}

fn parse_thread(raw: &str) -> Result<ThreadId> {
    let id: i32 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid Telegram thread id: {}", raw))?;
    Ok(ThreadId(MessageId(id)))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape `text` and turn `[text](http...)` links and `**bold**` runs into
/// Telegram HTML. Bracketed text without a URL, like labels, stays literal.
fn to_html(text: &str) -> String {
    let escaped = escape_html(text);
    let linked = LINK_RE.replace_all(&escaped, r#"<a href="$2">$1</a>"#);
    BOLD_RE.replace_all(&linked, "<b>$1</b>").into_owned()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max - 1).collect();
        format!("{}…", head)
    } else {
        text.to_string()
    }
}

/// Optional banner, bold title and body as one HTML message. Banner and
/// title are cut so the header stays inside `TITLE_RESERVE`.
fn compose(banner: Option<&str>, title: &str, body: &str) -> String {
    let mut text = String::new();
    if let Some(banner) = banner {
        text.push_str(&to_html(&truncate(banner, HEADER_LINE_MAX)));
        text.push_str("\n\n");
    }
    text.push_str(&format!(
        "<b>{}</b>\n\n",
        escape_html(&truncate(title, HEADER_LINE_MAX))
    ));
    text.push_str(&to_html(body));
    text
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn max_body_len(&self) -> usize {
        MAX_MESSAGE_LEN - TITLE_RESERVE
    }

    async fn send(&self, message: &OutgoingMessage<'_>) -> Result<()> {
        let thread = message.thread.map(parse_thread).transpose()?;

        debug!("Posting '{}' to Telegram chat {}", message.title, self.chat_id);
        self.send_html(compose(message.banner, message.title, message.body), thread)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

    /// Text as Telegram displays it: tags dropped, entities decoded.
    fn visible(html: &str) -> String {
        TAG_RE
            .replace_all(html, "")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&amp;", "&")
    }

    #[test]
    fn test_html_escapes_markup_chars() {
        assert_eq!(to_html("a < b & c > \"d\""), "a &lt; b &amp; c &gt; &quot;d&quot;");
    }

    #[test]
    fn test_links_become_anchors() {
        assert_eq!(
            to_html("1. [Fix <login>](https://cloud.example.com/apps/deck/#/board/1/card/5)"),
            "1. <a href=\"https://cloud.example.com/apps/deck/#/board/1/card/5\">Fix &lt;login&gt;</a>"
        );
    }

    #[test]
    fn test_labels_stay_literal() {
        assert_eq!(to_html("└ [Bug] [UI]"), "└ [Bug] [UI]");
        assert_eq!(to_html("2. [Error loading card]"), "2. [Error loading card]");
    }

    #[test]
    fn test_compose_puts_title_first() {
        assert_eq!(
            compose(None, "Todo", "1. [A](https://u)"),
            "<b>Todo</b>\n\n1. <a href=\"https://u\">A</a>"
        );
    }

    #[test]
    fn test_compose_attaches_banner() {
        let text = compose(
            Some("**Sprint** - Updated 2024-01-01 10:00:00"),
            "Todo",
            "1. [A](https://u)",
        );
        assert_eq!(
            text,
            "<b>Sprint</b> - Updated 2024-01-01 10:00:00\n\n<b>Todo</b>\n\n1. <a href=\"https://u\">A</a>"
        );
    }

    #[test]
    fn test_compose_fits_within_limit() {
        let banner = "B".repeat(1000);
        let title = "T".repeat(1000);
        let body = "b".repeat(MAX_MESSAGE_LEN - TITLE_RESERVE);
        let text = compose(Some(&banner), &title, &body);
        assert!(visible(&text).chars().count() <= MAX_MESSAGE_LEN);
        assert!(text.starts_with("BBB"));
        assert!(text.ends_with(&body));
    }

    #[test]
    fn test_escaping_does_not_count_against_limit() {
        let body = "&".repeat(MAX_MESSAGE_LEN - TITLE_RESERVE);
        let text = compose(Some("**Board** - Updated now"), "Todo", &body);
        assert!(text.chars().count() > MAX_MESSAGE_LEN);
        assert!(visible(&text).chars().count() <= MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_parse_thread() {
        assert_eq!(parse_thread(" 42 ").unwrap(), ThreadId(MessageId(42)));
        assert!(parse_thread("general").is_err());
    }

    #[test]
    fn test_max_body_len_leaves_room_for_title() {
        let notifier = TelegramNotifier::new(&TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: -1001,
            thread_id: None,
        });
        assert_eq!(notifier.name(), "telegram");
        assert!(notifier.max_body_len() + TITLE_RESERVE <= MAX_MESSAGE_LEN);
    }
}
