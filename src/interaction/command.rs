//! Parses commands addressed to the bot and answers them from the lore store.

use std::{sync::Arc, time::Duration};

use tokio::{sync::OwnedSemaphorePermit, task::JoinHandle};
use tracing::{Instrument, debug, error, instrument};

use crate::{
    base::{
        config::Config,
        replies,
        types::{IncomingMessage, LoreError},
    },
    service::db::DbClient,
};

use super::{outbound::Outbox, store_call};

/// How many rows `recent` and `top` return.
const LISTING_SIZE: usize = 3;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Random,
    Recent,
    Top,
    Highscores,
    /// All lore by one user.
    User(String),
    /// All lore containing a phrase.
    Search(String),
}

/// Parse `<@BOT> command [args...]`.
///
/// Returns `None` for anything that is not a well-formed command addressed to `bot_user_id`.
pub fn parse_command(text: &str, bot_user_id: &str) -> Option<Command> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    if tokens.len() < 2 {
        return None;
    }

    if replies::parse_user_id(tokens[0]) != bot_user_id {
        return None;
    }

    let args = &tokens[2..];

    match tokens[1] {
        "help" => Some(Command::Help),
        "random" => Some(Command::Random),
        "recent" => Some(Command::Recent),
        "top" => Some(Command::Top),
        "highscores" => Some(Command::Highscores),
        "user" if args.len() == 1 => Some(Command::User(replies::parse_user_id(args[0]).to_string())),
        "search" if !args.is_empty() => Some(Command::Search(args.join(" "))),
        _ => None,
    }
}

/// What a single message ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a command for us (or malformed).
    Ignored,
    /// A reply was queued.
    Replied(Command),
    /// The query came back empty and empty replies are switched off.
    Suppressed(Command),
}

/// The command dispatcher.
///
/// The bot identity is fixed at construction and compared by value.
pub struct CommandDispatcher {
    bot_user_id: String,
    db: DbClient,
    outbox: Outbox,
    store_timeout: Duration,
    reply_on_empty_results: bool,
}

impl CommandDispatcher {
    pub fn new(config: &Config, bot_user_id: String, db: DbClient, outbox: Outbox) -> Self {
        Self {
            bot_user_id,
            db,
            outbox,
            store_timeout: config.store_timeout(),
            reply_on_empty_results: config.reply_on_empty_results,
        }
    }

    /// Handle one channel message.
    #[instrument(skip_all, fields(channel = %message.channel_id))]
    pub async fn dispatch(&self, message: &IncomingMessage) -> Result<CommandOutcome, LoreError> {
        // Our own replies can mention us; never answer them.
        if message.user_id == self.bot_user_id {
            return Ok(CommandOutcome::Ignored);
        }

        let Some(command) = parse_command(&message.text, &self.bot_user_id) else {
            return Ok(CommandOutcome::Ignored);
        };

        debug!("Running command {:?}.", command);

        let (text, empty) = self.execute(&command).await?;

        if empty && !self.reply_on_empty_results {
            return Ok(CommandOutcome::Suppressed(command));
        }

        self.outbox.enqueue(&message.channel_id, text).await?;

        Ok(CommandOutcome::Replied(command))
    }

    /// Run the query behind a command, returning the reply text and whether the result set was empty.
    async fn execute(&self, command: &Command) -> Result<(String, bool), LoreError> {
        let deadline = self.store_timeout;

        let rows = match command {
            Command::Help => return Ok((replies::HELP_TEXT.to_string(), false)),
            Command::Highscores => {
                let rows = store_call("highscores", deadline, self.db.highscores()).await?;
                return Ok((replies::format_highscores(&rows), rows.is_empty()));
            }
            Command::Random => store_call("random", deadline, self.db.random(1)).await?,
            Command::Recent => store_call("recent", deadline, self.db.recent(LISTING_SIZE)).await?,
            Command::Top => store_call("top", deadline, self.db.top(LISTING_SIZE)).await?,
            Command::User(author_id) => store_call("by_user", deadline, self.db.by_user(author_id)).await?,
            Command::Search(query) => store_call("search", deadline, self.db.search(query)).await?,
        };

        Ok((replies::format_lore(&rows), rows.is_empty()))
    }
}

/// Handles a message event on its own task.
///
/// The permit is held until the task finishes, bounding how many handlers run at once.
#[instrument(skip_all)]
pub fn handle_message(message: IncomingMessage, dispatcher: Arc<CommandDispatcher>, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            // Process the event.
            let result = dispatcher.dispatch(&message).await;

            // Log any errors.
            match result {
                Ok(outcome) => debug!("Message handled: {:?}", outcome),
                Err(err) => error!("Error while handling: {}", err),
            }

            drop(permit);
        }
        .in_current_span(),
    )
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "BOT123";

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("<@BOT123> help", BOT), Some(Command::Help));
        assert_eq!(parse_command("<@BOT123> random", BOT), Some(Command::Random));
        assert_eq!(parse_command("<@BOT123> recent", BOT), Some(Command::Recent));
        assert_eq!(parse_command("<@BOT123> top", BOT), Some(Command::Top));
        assert_eq!(parse_command("<@BOT123> highscores", BOT), Some(Command::Highscores));
    }

    #[test]
    fn ignores_extra_whitespace() {
        assert_eq!(parse_command("  <@BOT123>\t  recent  ", BOT), Some(Command::Recent));
    }

    #[test]
    fn requires_two_tokens() {
        assert_eq!(parse_command("<@BOT123>", BOT), None);
        assert_eq!(parse_command("", BOT), None);
    }

    #[test]
    fn requires_bot_mention_first() {
        assert_eq!(parse_command("<@U999> recent", BOT), None);
        assert_eq!(parse_command("hey <@BOT123> recent", BOT), None);
        assert_eq!(parse_command("<@BOT123>: recent", BOT), None);
    }

    #[test]
    fn accepts_labelled_bot_mention() {
        assert_eq!(parse_command("<@BOT123|lorebot> top", BOT), Some(Command::Top));
    }

    #[test]
    fn user_needs_exactly_one_argument() {
        assert_eq!(parse_command("<@BOT123> user <@U42>", BOT), Some(Command::User("U42".to_string())));
        assert_eq!(parse_command("<@BOT123> user", BOT), None);
        assert_eq!(parse_command("<@BOT123> user <@U42> <@U43>", BOT), None);
    }

    #[test]
    fn search_joins_remaining_tokens() {
        assert_eq!(parse_command("<@BOT123> search big   red dog", BOT), Some(Command::Search("big red dog".to_string())));
        assert_eq!(parse_command("<@BOT123> search", BOT), None);
    }

    #[test]
    fn unknown_commands_are_ignored() {
        assert_eq!(parse_command("<@BOT123> dance", BOT), None);
        assert_eq!(parse_command("<@BOT123> HELP", BOT), None);
    }
}
