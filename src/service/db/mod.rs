use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Highscore, Lore, Res, UpsertOutcome, Void};

pub mod keyed;
pub mod surreal;

// Traits.

/// Generic lore store trait that clients must implement.
///
/// The pair `(author_id, message)` is the natural key of a lore row: implementations must never
/// hold two rows with the same pair.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Returns whether a row exists for the dedup key.
    async fn exists(&self, author_id: &str, message: &str) -> Res<bool>;

    /// Inserts a new row with the given initial score.
    ///
    /// Fails if a row already exists for the dedup key.
    async fn insert(&self, author_id: &str, message: &str, initial_score: i64) -> Void;

    /// Increments the score of an existing row by one.
    ///
    /// Upvoting a key with no row is a no-op.
    async fn upvote(&self, author_id: &str, message: &str) -> Void;

    /// Inserts a row with score 1, or upvotes the existing one, as a single atomic step.
    ///
    /// This is what the capture pipeline uses, so that concurrent captures of the same key
    /// converge on one row.
    async fn insert_or_upvote(&self, author_id: &str, message: &str) -> Res<UpsertOutcome>;

    /// The `n` most recently inserted rows, newest first.
    async fn recent(&self, n: usize) -> Res<Vec<Lore>>;

    /// Up to `n` rows picked uniformly at random.
    async fn random(&self, n: usize) -> Res<Vec<Lore>>;

    /// The `n` highest scored rows, highest first.
    async fn top(&self, n: usize) -> Res<Vec<Lore>>;

    /// All rows authored by the given user.
    async fn by_user(&self, author_id: &str) -> Res<Vec<Lore>>;

    /// All rows whose message contains `query`, ignoring case.
    async fn search(&self, query: &str) -> Res<Vec<Lore>>;

    /// Total score per author, highest first.
    async fn highscores(&self) -> Res<Vec<Highscore>>;
}

/// Lore store client for lore-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}
