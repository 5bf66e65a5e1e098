//! Resolves a reaction's target back into the chat message it was placed on.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::{
    base::types::{LoreError, ResolvedChatMessage},
    service::chat::ChatClient,
};

use super::with_deadline;

/// Looks up single messages by `(channel, timestamp)`.
#[derive(Clone)]
pub struct HistoryResolver {
    chat: ChatClient,
    deadline: Duration,
}

impl HistoryResolver {
    pub fn new(chat: ChatClient, deadline: Duration) -> Self {
        Self { chat, deadline }
    }

    /// Fetch the message at exactly `timestamp` in `channel_id`.
    ///
    /// Returns `Ok(None)` when history yields nothing, more than one candidate, or a message
    /// with a different timestamp (the target was deleted and an older message came back).
    /// Transport errors are returned unchanged for the caller to decide on; nothing is retried.
    #[instrument(skip(self))]
    pub async fn resolve(&self, channel_id: &str, timestamp: &str) -> Result<Option<ResolvedChatMessage>, LoreError> {
        let mut candidates = with_deadline("history lookup", self.deadline, self.chat.history(channel_id, timestamp, 1, true), LoreError::Transport).await?;

        if candidates.len() != 1 {
            debug!("History returned {} candidates; treating as not found.", candidates.len());
            return Ok(None);
        }

        let message = candidates.remove(0);

        if message.timestamp != timestamp {
            debug!("History returned `{}` instead of `{}`; treating as not found.", message.timestamp, timestamp);
            return Ok(None);
        }

        Ok(Some(message))
    }
}
