//! Fixed reply text and the formatting used for lore listings.

use crate::base::types::{Highscore, Lore};

/// Usage text for the `help` command.
pub const HELP_TEXT: &str = r#####"Lorebot commands:
  help - show this message
  random - a random piece of lore
  recent - the 3 most recently added lore
  top - the 3 highest scored lore
  highscores - total lore score per user
  user <@user> - all lore for a user
  search <query> - all lore containing the query

React to a message with :lore: to add it (or upvote it if it already exists)."#####;

/// Render a user ID as a platform mention.
pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// Strip mention decoration from a token: `<@U123>` and `<@U123|name>` both yield `U123`.
///
/// Tokens that are not decorated are returned as-is.
pub fn parse_user_id(token: &str) -> &str {
    let Some(inner) = token.strip_prefix("<@").and_then(|t| t.strip_suffix('>')) else {
        return token;
    };

    inner.split('|').next().unwrap_or(inner)
}

/// Confirmation posted after a first-time capture.
pub fn capture_confirmation(author_id: &str, text: &str) -> String {
    format!("Lore added: {}: {}", mention(author_id), text)
}

/// One line per lore row, `mention(author): text (score)`.
pub fn format_lore(rows: &[Lore]) -> String {
    rows.iter().map(|l| format!("{}: {} ({})", mention(&l.author_id), l.message, l.score)).collect::<Vec<_>>().join("\n")
}

/// One line per author, `mention(author): total`.
pub fn format_highscores(rows: &[Highscore]) -> String {
    rows.iter().map(|h| format!("{}: {}", mention(&h.author_id), h.score)).collect::<Vec<_>>().join("\n")
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn lore(author: &str, message: &str, score: i64) -> Lore {
        Lore {
            author_id: author.to_string(),
            message: message.to_string(),
            score,
            created_at: 0,
        }
    }

    #[test]
    fn parses_standard_mention() {
        assert_eq!(parse_user_id("<@U123ABC>"), "U123ABC");
    }

    #[test]
    fn parses_labelled_mention() {
        assert_eq!(parse_user_id("<@U123ABC|alice>"), "U123ABC");
    }

    #[test]
    fn leaves_plain_tokens_alone() {
        assert_eq!(parse_user_id("U123ABC"), "U123ABC");
        assert_eq!(parse_user_id("<@U123ABC>:"), "<@U123ABC>:");
    }

    #[test]
    fn formats_rows_one_per_line() {
        let rows = vec![lore("U1", "first", 3), lore("U2", "second", 1)];

        assert_eq!(format_lore(&rows), "<@U1>: first (3)\n<@U2>: second (1)");
    }

    #[test]
    fn formats_empty_set_as_empty_string() {
        assert_eq!(format_lore(&[]), "");
        assert_eq!(format_highscores(&[]), "");
    }

    #[test]
    fn formats_highscores() {
        let rows = vec![
            Highscore { author_id: "U1".to_string(), score: 7 },
            Highscore { author_id: "U2".to_string(), score: 2 },
        ];

        assert_eq!(format_highscores(&rows), "<@U1>: 7\n<@U2>: 2");
    }

    #[test]
    fn confirmation_mentions_author() {
        assert_eq!(capture_confirmation("U9", "hello world"), "Lore added: <@U9>: hello world");
    }
}
