//! Event handling and user interactions for lore-bot.
//!
//! This module provides the capture-and-dispatch core:
//! - Resolving a reaction back to the message it targets
//! - Capturing reacted messages as lore (or upvoting existing lore)
//! - Parsing and answering commands addressed to the bot
//! - Serializing all replies through a single outbound worker

pub mod capture;
pub mod command;
pub mod history;
pub mod outbound;

use std::time::Duration;

use crate::base::types::{Err, LoreError, Res};

/// Await an external call under a deadline, classifying its failure.
pub(crate) async fn with_deadline<T, F>(what: &'static str, deadline: Duration, call: F, classify: fn(Err) -> LoreError) -> Result<T, LoreError>
where
    F: Future<Output = Res<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(classify(err)),
        Err(_) => Err(LoreError::Timeout(what)),
    }
}

/// Await a store call under a deadline.
pub(crate) async fn store_call<T, F>(what: &'static str, deadline: Duration, call: F) -> Result<T, LoreError>
where
    F: Future<Output = Res<T>>,
{
    with_deadline(what, deadline, call, LoreError::Store).await
}
