//! Runtime services, shared state, and the event dispatch loop.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ChatEvent, LoreError, OutboundMessage, Res, Void},
    },
    interaction::{
        capture::{self, CapturePipeline},
        command::{self, CommandDispatcher},
        history::HistoryResolver,
        outbound::{Outbox, OutboundWorker},
    },
    service::{chat::ChatClient, db::DbClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the clients, the outbound queue, and both pipelines.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The lore store.
    pub db: DbClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// Sending half of the outbound queue.
    pub outbox: Outbox,
    /// Reaction handling.
    pub capture: Arc<CapturePipeline>,
    /// Command handling.
    pub commands: Arc<CommandDispatcher>,
}

impl Runtime {
    /// Create a new runtime instance, connecting to the store and the chat platform.
    ///
    /// Also returns the receiving half of the outbound queue, to be handed to [`Runtime::start`].
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<(Self, mpsc::Receiver<OutboundMessage>)> {
        // Initialize the database.
        let db = DbClient::surreal(&config).await?;

        // Initialize the slack client.
        let chat = ChatClient::slack(&config).await?;

        Ok(Self::from_parts(config, db, chat))
    }

    /// Assemble a runtime from already-built clients.
    pub fn from_parts(config: Config, db: DbClient, chat: ChatClient) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (outbox, outbound) = Outbox::new(config.outbound_queue_capacity);

        // The identity is captured once here; nothing reads it from ambient state later.
        let bot_user_id = config.bot_user_id.clone().unwrap_or_else(|| chat.bot_user_id().to_string());

        let resolver = HistoryResolver::new(chat.clone(), config.history_timeout());
        let capture = Arc::new(CapturePipeline::new(&config, bot_user_id.clone(), resolver, db.clone(), outbox.clone()));
        let commands = Arc::new(CommandDispatcher::new(&config, bot_user_id, db.clone(), outbox.clone()));

        let runtime = Self {
            config,
            db,
            chat,
            outbox,
            capture,
            commands,
        };

        (runtime, outbound)
    }

    /// Run the bot: the outbound worker, the chat listener, and the dispatch loop.
    ///
    /// Returns when the event stream ends, or with an error when authentication fails.
    pub async fn start(&self, outbound: mpsc::Receiver<OutboundMessage>) -> Void {
        tokio::spawn(OutboundWorker::new(outbound, self.chat.clone(), self.config.post_timeout()).run());

        let (events_tx, events_rx) = mpsc::channel(self.config.max_concurrent_events);

        let chat = self.chat.clone();
        let listener = tokio::spawn(async move {
            if let Err(err) = chat.start(events_tx).await {
                error!("Chat listener stopped: {}", err);
            }
        });

        let result = self.run_dispatch_loop(events_rx).await;

        listener.abort();

        result
    }

    /// Consume events one at a time, handing each to its pipeline on a separate task.
    ///
    /// At most `max_concurrent_events` handlers run at once; when all permits are taken the loop
    /// waits, which in turn backs up the event channel.
    #[instrument(skip_all)]
    pub async fn run_dispatch_loop(&self, mut events: mpsc::Receiver<ChatEvent>) -> Void {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_events));

        info!("Dispatch loop started.");

        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::AuthInvalid => {
                    error!("Invalid credentials; shutting down.");
                    return Err(LoreError::AuthInvalid.into());
                }
                ChatEvent::Message(message) => {
                    let permit = permits.clone().acquire_owned().await?;
                    command::handle_message(message, self.commands.clone(), permit);
                }
                ChatEvent::ReactionAdded(reaction) => {
                    let permit = permits.clone().acquire_owned().await?;
                    capture::handle_reaction_added(reaction, self.capture.clone(), permit);
                }
                ChatEvent::Other(kind) => {
                    debug!("Ignoring event: {}", kind);
                }
            }
        }

        warn!("Event stream ended.");

        Ok(())
    }
}
