//! Slack implementation of the chat transport.
//!
//! Events arrive over socket mode, get normalized into [`ChatEvent`]s, and are forwarded to
//! the runtime's dispatch loop.  Posting and history lookup go through the Web API.

use crate::base::{
    config::Config,
    types::{ChatEvent, IncomingMessage, ReactionAdded, Res, ResolvedChatMessage, Void},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, instrument, warn};

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config) -> Res<Self> {
        let client = SlackChatClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// How many recent event IDs are remembered to spot redeliveries.
const SEEN_EVENTS_CAPACITY: usize = 1024;

/// User state for the slack socket client.
struct SlackUserState {
    events: mpsc::Sender<ChatEvent>,
    seen: Mutex<SeenEvents>,
}

/// A bounded record of recently delivered event IDs.
///
/// Slack redelivers an envelope whose ack was late; the copy carries the same event ID.
struct SeenEvents {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenEvents {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id`, returning `false` if it was already recorded.
    fn first_sighting(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }

        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());

        true
    }
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    app_token: SlackApiToken,
    bot_token: SlackApiToken,
    bot_user_id: String,
    client: Arc<FullClient>,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    async fn new(config: &Config) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID, unless it is configured explicitly.

        let bot_user_id = match &config.bot_user_id {
            Some(id) => id.clone(),
            None => {
                let session = client.open_session(&bot_token);
                let bot_user = session.auth_test().await.map_err(|e| anyhow::anyhow!("Slack rejected the bot token: {}", e))?;
                bot_user.user_id.0
            }
        };

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self, events: mpsc::Sender<ChatEvent>) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            events: events.clone(),
            seen: Mutex::new(SeenEvents::new(SEEN_EVENTS_CAPACITY)),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register the app token; Slack refuses the connection here when the token is bad.
        if let Err(e) = socket_mode_listener.listen_for(&self.app_token).await {
            error!("Failed to open socket mode connection: {}", e);
            let _ = events.send(ChatEvent::AuthInvalid).await;
            return Err(anyhow::anyhow!("Failed to open socket mode connection: {}", e));
        }

        // Serve until Ctrl-C.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn post_message(&self, channel_id: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message).with_as_user(true).with_link_names(true);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn history(&self, channel_id: &str, latest: &str, limit: u16, inclusive: bool) -> Res<Vec<ResolvedChatMessage>> {
        let request = SlackApiConversationsHistoryRequest::new()
            .with_channel(SlackChannelId(channel_id.to_string()))
            .with_latest(SlackTs(latest.to_string()))
            .with_limit(limit)
            .with_inclusive(inclusive);

        let session = self.client.open_session(&self.bot_token);

        let response = session.conversations_history(&request).await.map_err(|e| anyhow::anyhow!("Failed to fetch history: {}", e))?;

        let messages = response
            .messages
            .into_iter()
            .map(|m| ResolvedChatMessage {
                // Bot and integration posts are reported with no author.
                author_id: if m.sender.bot_id.is_some() { String::new() } else { m.sender.user.map(|u| u.0).unwrap_or_default() },
                text: m.content.text.unwrap_or_default(),
                timestamp: m.origin.ts.0,
            })
            .collect();

        Ok(messages)
    }
}

// Event normalization.

/// Turn a Slack push event into the bot's own event type.
fn normalize(event: SlackEventCallbackBody) -> ChatEvent {
    match event {
        SlackEventCallbackBody::Message(message) => {
            let Some(channel) = message.origin.channel else {
                return ChatEvent::Other("message without channel".to_string());
            };

            ChatEvent::Message(IncomingMessage {
                channel_id: channel.0,
                user_id: message.sender.user.map(|u| u.0).unwrap_or_default(),
                text: message.content.and_then(|c| c.text).unwrap_or_default(),
            })
        }
        SlackEventCallbackBody::ReactionAdded(reaction) => match reaction.item {
            SlackReactionsItem::Message(item) => {
                let Some(channel) = item.origin.channel else {
                    return ChatEvent::Other("reaction without channel".to_string());
                };

                ChatEvent::ReactionAdded(ReactionAdded {
                    reaction: reaction.reaction.0,
                    channel_id: channel.0,
                    item_timestamp: item.origin.ts.0,
                })
            }
            _ => ChatEvent::Other("reaction on non-message item".to_string()),
        },
        SlackEventCallbackBody::AppUninstalled(_) => ChatEvent::AuthInvalid,
        SlackEventCallbackBody::AppMention(_) => ChatEvent::Other("app_mention".to_string()),
        SlackEventCallbackBody::ReactionRemoved(_) => ChatEvent::Other("reaction_removed".to_string()),
        _ => ChatEvent::Other("unhandled push event".to_string()),
    }
}

/// Hand an event to the dispatch loop without waiting.
///
/// The socket-mode ack is only sent once the push callback returns, so this never blocks; when
/// the loop is saturated the event is dropped.  Returns whether the event was queued.
fn forward(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!("Dispatch loop is saturated; dropping event: {:?}", event);
            false
        }
        Err(TrySendError::Closed(_)) => {
            warn!("Dispatch loop has shut down; dropping event.");
            false
        }
    }
}

// Socket mode listener callbacks for Slack.

/// Handles push events from Slack by forwarding them to the dispatch loop.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    let first_sighting = match user_state.seen.lock() {
        Ok(mut seen) => seen.first_sighting(&event_callback.event_id.0),
        Err(_) => true,
    };

    if !first_sighting {
        debug!("Skipping redelivered event `{}`.", event_callback.event_id.0);
        return Ok(());
    }

    let event = normalize(event_callback.event);
    debug!("Forwarding event: {:?}", event);

    forward(&user_state.events, event);

    Ok(())
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn other(kind: &str) -> ChatEvent {
        ChatEvent::Other(kind.to_string())
    }

    #[test]
    fn forward_drops_instead_of_waiting_when_saturated() {
        let (tx, mut rx) = mpsc::channel(1);

        assert!(forward(&tx, other("first")));
        assert!(!forward(&tx, other("second")));

        assert_eq!(rx.try_recv().unwrap(), other("first"));
        assert!(rx.try_recv().is_err());

        assert!(forward(&tx, other("third")));
        assert_eq!(rx.try_recv().unwrap(), other("third"));
    }

    #[test]
    fn forward_reports_a_closed_loop() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        assert!(!forward(&tx, ChatEvent::AuthInvalid));
    }

    #[test]
    fn redelivered_event_ids_are_recognized() {
        let mut seen = SeenEvents::new(2);

        assert!(seen.first_sighting("Ev1"));
        assert!(!seen.first_sighting("Ev1"));
        assert!(seen.first_sighting("Ev2"));
        assert!(!seen.first_sighting("Ev2"));

        // The oldest ID falls out once the window is full.
        assert!(seen.first_sighting("Ev3"));
        assert!(seen.first_sighting("Ev1"));
        assert!(!seen.first_sighting("Ev3"));
    }
}
