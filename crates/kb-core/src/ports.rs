use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{Channel, ExtractedMessage},
    Result,
};

/// User id -> display name.
pub type UserDirectory = HashMap<String, String>;

/// Hexagonal port for the chat workspace being mined.
///
/// Implementations own pagination, pacing and rate-limit retries. When a
/// pagination loop fails part-way they should log and return what they have.
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Channels with at least the configured member count, largest first.
    async fn list_channels(&self) -> Result<Vec<Channel>>;

    async fn list_users(&self) -> Result<UserDirectory>;

    /// Human-authored messages of `channel` posted at or after `oldest`.
    async fn channel_messages(
        &self,
        channel: &Channel,
        oldest: DateTime<Utc>,
        users: &UserDirectory,
    ) -> Result<Vec<ExtractedMessage>>;
}

/// Hexagonal port for the remote LLM used for classification.
///
/// Returns the raw text of the model's reply; parsing and shape validation
/// happen in [`crate::classifier`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
