pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::base::types::{ChatEvent, Res, ResolvedChatMessage, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the transport surface the bot needs from a chat platform
/// like Slack: an event stream, posting, and history lookup.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Returns the unique identifier for the bot in the chat platform,
    /// which is used to detect when the bot is addressed.
    fn bot_user_id(&self) -> &str;

    /// Start the chat client listener.
    ///
    /// Normalized events are pushed into `events` until the connection ends.  An
    /// authentication failure is reported as [`ChatEvent::AuthInvalid`].
    async fn start(&self, events: mpsc::Sender<ChatEvent>) -> Void;

    /// Post a message to a channel.
    async fn post_message(&self, channel_id: &str, text: &str) -> Void;

    /// Fetch channel history at or before `latest`.
    ///
    /// Returns at most `limit` messages, newest first.  With `inclusive`, a message whose
    /// timestamp equals `latest` is included.
    async fn history(&self, channel_id: &str, latest: &str, limit: u16, inclusive: bool) -> Res<Vec<ResolvedChatMessage>>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
