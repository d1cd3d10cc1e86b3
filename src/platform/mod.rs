pub mod discord;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// A message ready to be posted to a chat service.
#[derive(Debug, Clone)]
pub struct OutgoingMessage<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub banner: Option<&'a str>,
    /// Platform-specific thread or topic identifier
    pub thread: Option<&'a str>,
}

/// Write-only chat sink. Implementations neither validate nor split the
/// body; callers keep it within [`Notifier::max_body_len`].
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Platform identifier (e.g., "discord", "telegram")
    fn name(&self) -> &str;

    /// Largest body, in characters, a single message may carry.
    fn max_body_len(&self) -> usize;

    async fn send(&self, message: &OutgoingMessage<'_>) -> Result<()>;
}
