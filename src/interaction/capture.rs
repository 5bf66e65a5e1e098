//! Turns a lore reaction into a stored (or upvoted) piece of lore.

use std::{sync::Arc, time::Duration};

use tokio::{sync::OwnedSemaphorePermit, task::JoinHandle};
use tracing::{Instrument, debug, error, info, instrument};

use crate::{
    base::{
        config::Config,
        replies,
        types::{LoreError, ReactionAdded, UpsertOutcome},
    },
    service::db::DbClient,
};

use super::{history::HistoryResolver, outbound::Outbox, store_call};

/// What a single reaction ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Not the lore reaction.
    Ignored,
    /// The target message could not be pinned down.
    Unresolved,
    /// The target was written by the bot itself.
    SelfAuthored,
    /// New lore, confirmation queued.
    Inserted,
    /// Existing lore, score bumped silently.
    Upvoted,
}

/// The capture pipeline.
pub struct CapturePipeline {
    lore_reaction: String,
    bot_user_id: String,
    resolver: HistoryResolver,
    db: DbClient,
    outbox: Outbox,
    store_timeout: Duration,
}

impl CapturePipeline {
    pub fn new(config: &Config, bot_user_id: String, resolver: HistoryResolver, db: DbClient, outbox: Outbox) -> Self {
        Self {
            lore_reaction: config.lore_reaction.clone(),
            bot_user_id,
            resolver,
            db,
            outbox,
            store_timeout: config.store_timeout(),
        }
    }

    /// Run one reaction through the pipeline.
    ///
    /// Only `Inserted` has a user-visible effect.  Errors leave the store untouched.
    #[instrument(skip_all, fields(channel = %event.channel_id, ts = %event.item_timestamp))]
    pub async fn capture(&self, event: &ReactionAdded) -> Result<CaptureOutcome, LoreError> {
        if event.reaction != self.lore_reaction {
            return Ok(CaptureOutcome::Ignored);
        }

        let Some(message) = self.resolver.resolve(&event.channel_id, &event.item_timestamp).await? else {
            debug!("Lore reaction on an unresolvable message.");
            return Ok(CaptureOutcome::Unresolved);
        };

        if message.author_id.is_empty() || message.author_id == self.bot_user_id {
            debug!("Lore reaction on the bot's own message.");
            return Ok(CaptureOutcome::SelfAuthored);
        }

        let outcome = store_call("insert-or-upvote", self.store_timeout, self.db.insert_or_upvote(&message.author_id, &message.text)).await?;

        match outcome {
            UpsertOutcome::Upvoted => {
                info!("Upvoted lore from `{}`.", message.author_id);
                Ok(CaptureOutcome::Upvoted)
            }
            UpsertOutcome::Inserted => {
                info!("Captured new lore from `{}`.", message.author_id);
                self.outbox.enqueue(&event.channel_id, replies::capture_confirmation(&message.author_id, &message.text)).await?;
                Ok(CaptureOutcome::Inserted)
            }
        }
    }
}

/// Handles a reaction event on its own task.
///
/// The permit is held until the task finishes, bounding how many handlers run at once.
#[instrument(skip_all)]
pub fn handle_reaction_added(event: ReactionAdded, pipeline: Arc<CapturePipeline>, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            // Process the event.
            let result = pipeline.capture(&event).await;

            // Log any errors.
            match result {
                Ok(outcome) => debug!("Reaction handled: {:?}", outcome),
                Err(err) => error!("Error while handling: {}", err),
            }

            drop(permit);
        }
        .in_current_span(),
    )
}
