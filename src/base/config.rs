//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::Res;

/// Default reaction name that marks a message as lore.
fn default_lore_reaction() -> String {
    "lore".to_string()
}

/// Default database endpoint (in-memory).
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

/// Default database namespace.
fn default_db_namespace() -> String {
    "lore".to_string()
}

/// Default database name.
fn default_db_database() -> String {
    "bot".to_string()
}

/// Default number of concurrent store operations.
fn default_db_max_connections() -> usize {
    50
}

/// Default outbound queue capacity.
fn default_outbound_queue_capacity() -> usize {
    1000
}

/// Default number of event handlers allowed in flight.
fn default_max_concurrent_events() -> usize {
    64
}

/// Default deadline for external calls, in seconds.
fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Configuration for the lore-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Explicit bot user ID (`BOT_USER_ID`).  When unset, the chat client asks the platform.
    #[serde(default)]
    pub bot_user_id: Option<String>,
    /// Reaction name that triggers a capture (`LORE_REACTION`).
    #[serde(default = "default_lore_reaction")]
    pub lore_reaction: String,
    /// Database endpoint URL (`DB_ENDPOINT`), e.g. `ws://localhost:8000` or `mem://`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Maximum number of store operations in flight at once (`DB_MAX_CONNECTIONS`).
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: usize,
    /// Capacity of the outbound message queue (`OUTBOUND_QUEUE_CAPACITY`).
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Maximum number of event handlers running at once (`MAX_CONCURRENT_EVENTS`).
    #[serde(default = "default_max_concurrent_events")]
    pub max_concurrent_events: usize,
    /// Deadline for a history lookup (`HISTORY_TIMEOUT_SECS`).
    #[serde(default = "default_timeout_secs")]
    pub history_timeout_secs: u64,
    /// Deadline for a single store call (`STORE_TIMEOUT_SECS`).
    #[serde(default = "default_timeout_secs")]
    pub store_timeout_secs: u64,
    /// Deadline for posting one outbound message (`POST_TIMEOUT_SECS`).
    #[serde(default = "default_timeout_secs")]
    pub post_timeout_secs: u64,
    /// Whether a query with no rows still produces an (empty) reply (`REPLY_ON_EMPTY_RESULTS`).
    #[serde(default = "default_true")]
    pub reply_on_empty_results: bool,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            slack_app_token: String::new(),
            slack_bot_token: String::new(),
            bot_user_id: None,
            lore_reaction: default_lore_reaction(),
            db_endpoint: default_db_endpoint(),
            db_username: None,
            db_password: None,
            db_namespace: default_db_namespace(),
            db_database: default_db_database(),
            db_max_connections: default_db_max_connections(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            max_concurrent_events: default_max_concurrent_events(),
            history_timeout_secs: default_timeout_secs(),
            store_timeout_secs: default_timeout_secs(),
            post_timeout_secs: default_timeout_secs(),
            reply_on_empty_results: true,
        }
    }
}

impl ConfigInner {
    /// Deadline for a history lookup.
    pub fn history_timeout(&self) -> Duration {
        Duration::from_secs(self.history_timeout_secs)
    }

    /// Deadline for a single store call.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Deadline for posting one outbound message.
    pub fn post_timeout(&self) -> Duration {
        Duration::from_secs(self.post_timeout_secs)
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("LORE_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Rejects values that would stall or disable the bot.
    pub fn validate(&self) -> Res<()> {
        if self.lore_reaction.trim().is_empty() {
            return Err(anyhow::anyhow!("Lore reaction must not be empty."));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("Database max connections must be at least 1."));
        }

        if self.outbound_queue_capacity == 0 {
            return Err(anyhow::anyhow!("Outbound queue capacity must be at least 1."));
        }

        if self.max_concurrent_events == 0 {
            return Err(anyhow::anyhow!("Max concurrent events must be at least 1."));
        }

        if self.history_timeout_secs == 0 || self.store_timeout_secs == 0 || self.post_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeouts must be at least one second."));
        }

        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::from(ConfigInner::default());

        assert!(config.validate().is_ok());
        assert_eq!(config.lore_reaction, "lore");
        assert_eq!(config.outbound_queue_capacity, 1000);
        assert_eq!(config.db_max_connections, 50);
        assert!(config.reply_on_empty_results);
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = Config::from(ConfigInner {
            outbound_queue_capacity: 0,
            ..Default::default()
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_blank_reaction() {
        let config = Config::from(ConfigInner {
            lore_reaction: "  ".to_string(),
            ..Default::default()
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = Config::from(ConfigInner {
            store_timeout_secs: 0,
            ..Default::default()
        });

        assert!(config.validate().is_err());

        let config = Config::from(ConfigInner {
            post_timeout_secs: 0,
            ..Default::default()
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_toml_file() {
        let path = std::env::temp_dir().join(format!("lore-bot-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "slack_app_token = \"xapp-1\"\nslack_bot_token = \"xoxb-1\"\nlore_reaction = \"scroll\"\nreply_on_empty_results = false\npost_timeout_secs = 3\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.slack_app_token, "xapp-1");
        assert_eq!(config.lore_reaction, "scroll");
        assert!(!config.reply_on_empty_results);
        assert_eq!(config.db_endpoint, "mem://");
        assert_eq!(config.post_timeout(), Duration::from_secs(3));
        assert_eq!(config.store_timeout(), Duration::from_secs(10));
    }
}
