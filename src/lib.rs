//! Library root for `lore-bot`.
//!
//! Lore-bot lets a Slack community curate a shared corpus of short snippets ("lore"):
//! - React to a message with `:lore:` to capture it (or upvote it if it is already known)
//! - Mention the bot with a command (`recent`, `top`, `random`, `search`, ...) to read it back
//!
//! The bot integrates with Slack for chat and SurrealDB for storage.  Events are dispatched
//! from a single loop onto bounded handler tasks, and every reply is posted by one
//! outbound worker so replies never race each other.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the lore-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database and chat clients
/// - Starts the outbound worker and the main event loop
pub async fn start(config: Config) -> Void {
    info!("Starting lore-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider().install_default().map_err(|_| anyhow::anyhow!("A crypto provider is already installed."))?;

    // Initialize the runtime.
    let (runtime, outbound) = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start(outbound).await?;

    Ok(())
}
