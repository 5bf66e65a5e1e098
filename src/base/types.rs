use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Errors.

/// Failure classes for a single event.
///
/// Everything except [`LoreError::AuthInvalid`] is isolated to the event that produced it.
#[derive(Debug, thiserror::Error)]
pub enum LoreError {
    /// The chat platform (post or history lookup) failed.
    #[error("transport failure: {0:#}")]
    Transport(Err),
    /// The lore store failed.
    #[error("store failure: {0:#}")]
    Store(Err),
    /// An external call did not finish within its deadline.
    #[error("{0} timed out")]
    Timeout(&'static str),
    /// The event stream rejected our credentials.
    #[error("invalid credentials on the event stream")]
    AuthInvalid,
}

// Lore.

/// A captured snippet, attributed to its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lore {
    pub author_id: String,
    pub message: String,
    pub score: i64,
    /// Insertion time, in microseconds since the unix epoch.
    pub created_at: i64,
}

/// Sum of scores across everything an author has had captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highscore {
    pub author_id: String,
    pub score: i64,
}

/// Result of an atomic insert-or-upvote on a dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Upvoted,
}

// Chat.

/// A message fetched back out of channel history.
///
/// An empty `author_id` means the bot (or another integration) wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChatMessage {
    pub author_id: String,
    pub text: String,
    pub timestamp: String,
}

/// A reply waiting in the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub text: String,
}

/// A plain channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub channel_id: String,
    /// Sender of the message; empty when the platform reports none.
    pub user_id: String,
    pub text: String,
}

/// A reaction placed on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionAdded {
    pub reaction: String,
    pub channel_id: String,
    /// Timestamp of the message the reaction targets.
    pub item_timestamp: String,
}

/// Normalized inbound event, produced by the chat adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(IncomingMessage),
    ReactionAdded(ReactionAdded),
    AuthInvalid,
    /// Anything else the platform sends us, by kind.
    Other(String),
}
