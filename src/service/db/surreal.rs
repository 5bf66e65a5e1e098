//! SurrealDB implementation of the lore store.
//!
//! Each row is addressed by a record ID built from its dedup key (`lore:[author_id, message]`),
//! with a `UNIQUE` index on the same pair, so a duplicate row cannot be written even by a stray
//! `CREATE`.  Writes to a single key are additionally serialized in-process.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    method::Query,
    opt::auth::Root,
};
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::base::{
    config::Config,
    types::{Highscore, Lore, Res, UpsertOutcome, Void},
};

use super::{DbClient, GenericDbClient, keyed::KeyedLocks};

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Creates a SurrealDB-backed client from the configuration.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates a client backed by a fresh in-memory database.
    pub async fn surreal_memory() -> Res<Self> {
        let config = Config::from(crate::base::config::ConfigInner::default());
        Self::surreal(&config).await
    }
}

// Structs.

/// Row shape for single-column score projections.
#[derive(Debug, Deserialize)]
struct ScoreRow {
    score: i64,
}

/// Row shape for the insertion stamp returned by an upsert.
#[derive(Debug, Deserialize)]
struct StampRow {
    created_at: i64,
}

/// Row shape for per-author score totals.
#[derive(Debug, Deserialize)]
struct TotalRow {
    author_id: String,
    total: i64,
}

/// SurrealDB lore store.
struct SurrealDbClient {
    db: Surreal<Any>,
    /// Bounds the number of store operations in flight.
    pool: Semaphore,
    /// Serializes writers on the same dedup key.
    writers: KeyedLocks<(String, String)>,
    /// Last handed-out `created_at`, so insertion order is strict within a process.
    clock: AtomicI64,
}

impl SurrealDbClient {
    /// Connect, authenticate when credentials are configured, and define the schema.
    #[instrument(name = "SurrealDbClient::new", skip_all)]
    async fn new(config: &Config) -> Res<Self> {
        let db = any::connect(config.db_endpoint.as_str()).await?;

        if let (Some(username), Some(password)) = (&config.db_username, &config.db_password) {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns(config.db_namespace.as_str()).use_db(config.db_database.as_str()).await?;

        // Define schemas.

        db.query(
            r#"
            DEFINE TABLE IF NOT EXISTS lore SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS author_id ON lore TYPE string;
            DEFINE FIELD IF NOT EXISTS message ON lore TYPE string;
            DEFINE FIELD IF NOT EXISTS score ON lore TYPE int;
            DEFINE FIELD IF NOT EXISTS created_at ON lore TYPE int;
            DEFINE INDEX IF NOT EXISTS lore_key ON lore FIELDS author_id, message UNIQUE;
            "#,
        )
        .await?
        .check()?;

        info!("Database initialized at `{}`.", config.db_endpoint);

        Ok(Self {
            db,
            pool: Semaphore::new(config.db_max_connections),
            writers: KeyedLocks::new(),
            clock: AtomicI64::new(0),
        })
    }

    /// Monotonic insertion timestamp in microseconds.
    fn next_created_at(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_micros();
        let previous = self.clock.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1))).unwrap_or(now);

        now.max(previous + 1)
    }
}

/// Runs a prepared lore listing query.
async fn fetch_lore(query: Query<'_, Any>) -> Res<Vec<Lore>> {
    let rows: Vec<Lore> = query.await?.take(0)?;

    Ok(rows)
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn exists(&self, author_id: &str, message: &str) -> Res<bool> {
        let _permit = self.pool.acquire().await?;

        let rows: Vec<ScoreRow> = self
            .db
            .query("SELECT score FROM type::thing('lore', [$author_id, $message])")
            .bind(("author_id", author_id.to_string()))
            .bind(("message", message.to_string()))
            .await?
            .take(0)?;

        Ok(!rows.is_empty())
    }

    #[instrument(skip(self))]
    async fn insert(&self, author_id: &str, message: &str, initial_score: i64) -> Void {
        let _writer = self.writers.lock((author_id.to_string(), message.to_string())).await;
        let _permit = self.pool.acquire().await?;

        self.db
            .query("CREATE type::thing('lore', [$author_id, $message]) SET author_id = $author_id, message = $message, score = $score, created_at = $created_at")
            .bind(("author_id", author_id.to_string()))
            .bind(("message", message.to_string()))
            .bind(("score", initial_score))
            .bind(("created_at", self.next_created_at()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn upvote(&self, author_id: &str, message: &str) -> Void {
        let _writer = self.writers.lock((author_id.to_string(), message.to_string())).await;
        let _permit = self.pool.acquire().await?;

        self.db
            .query("UPDATE type::thing('lore', [$author_id, $message]) SET score += 1")
            .bind(("author_id", author_id.to_string()))
            .bind(("message", message.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn insert_or_upvote(&self, author_id: &str, message: &str) -> Res<UpsertOutcome> {
        let _writer = self.writers.lock((author_id.to_string(), message.to_string())).await;
        let _permit = self.pool.acquire().await?;

        let stamp = self.next_created_at();

        let row: Option<StampRow> = self
            .db
            .query(
                "UPSERT type::thing('lore', [$author_id, $message]) SET author_id = $author_id, message = $message, score = (score ?? 0) + 1, created_at = created_at ?? $created_at RETURN created_at",
            )
            .bind(("author_id", author_id.to_string()))
            .bind(("message", message.to_string()))
            .bind(("created_at", stamp))
            .await?
            .take(0)?;

        // Stamps are unique, so the row is new exactly when it kept the one we just handed out.
        match row {
            Some(StampRow { created_at }) if created_at == stamp => Ok(UpsertOutcome::Inserted),
            Some(_) => Ok(UpsertOutcome::Upvoted),
            None => Err(anyhow::anyhow!("Upsert of lore returned no row.")),
        }
    }

    #[instrument(skip(self))]
    async fn recent(&self, n: usize) -> Res<Vec<Lore>> {
        let _permit = self.pool.acquire().await?;

        fetch_lore(self.db.query("SELECT author_id, message, score, created_at FROM lore ORDER BY created_at DESC LIMIT $limit").bind(("limit", n as i64))).await
    }

    #[instrument(skip(self))]
    async fn random(&self, n: usize) -> Res<Vec<Lore>> {
        let _permit = self.pool.acquire().await?;

        fetch_lore(self.db.query("SELECT author_id, message, score, created_at FROM lore ORDER BY RAND() LIMIT $limit").bind(("limit", n as i64))).await
    }

    #[instrument(skip(self))]
    async fn top(&self, n: usize) -> Res<Vec<Lore>> {
        let _permit = self.pool.acquire().await?;

        fetch_lore(self.db.query("SELECT author_id, message, score, created_at FROM lore ORDER BY score DESC, created_at DESC LIMIT $limit").bind(("limit", n as i64))).await
    }

    #[instrument(skip(self))]
    async fn by_user(&self, author_id: &str) -> Res<Vec<Lore>> {
        let _permit = self.pool.acquire().await?;

        fetch_lore(
            self.db
                .query("SELECT author_id, message, score, created_at FROM lore WHERE author_id = $author_id ORDER BY created_at DESC")
                .bind(("author_id", author_id.to_string())),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Res<Vec<Lore>> {
        let _permit = self.pool.acquire().await?;

        fetch_lore(
            self.db
                .query("SELECT author_id, message, score, created_at FROM lore WHERE string::lowercase(message) CONTAINS string::lowercase($query) ORDER BY created_at DESC")
                .bind(("query", query.to_string())),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn highscores(&self) -> Res<Vec<Highscore>> {
        let _permit = self.pool.acquire().await?;

        let totals: Vec<TotalRow> = self.db.query("SELECT author_id, math::sum(score) AS total FROM lore GROUP BY author_id").await?.take(0)?;

        let mut rows: Vec<Highscore> = totals.into_iter().map(|t| Highscore { author_id: t.author_id, score: t.total }).collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.author_id.cmp(&b.author_id)));

        Ok(rows)
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> DbClient {
        DbClient::surreal_memory().await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_exists() {
        let db = store().await;

        assert!(!db.exists("U1", "hello").await.unwrap());
        db.insert("U1", "hello", 1).await.unwrap();
        assert!(db.exists("U1", "hello").await.unwrap());
        assert!(!db.exists("U2", "hello").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let db = store().await;

        db.insert("U1", "hello", 1).await.unwrap();
        assert!(db.insert("U1", "hello", 1).await.is_err());
        assert_eq!(db.by_user("U1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upvote_increments_by_one() {
        let db = store().await;

        db.insert("U1", "hello", 1).await.unwrap();
        db.upvote("U1", "hello").await.unwrap();

        let rows = db.by_user("U1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 2);
    }

    #[tokio::test]
    async fn upvote_of_missing_key_creates_nothing() {
        let db = store().await;

        db.upvote("U1", "ghost").await.unwrap();

        assert!(!db.exists("U1", "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn insert_or_upvote_converges_on_one_row() {
        let db = store().await;

        assert_eq!(db.insert_or_upvote("U1", "hello").await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(db.insert_or_upvote("U1", "hello").await.unwrap(), UpsertOutcome::Upvoted);
        assert_eq!(db.insert_or_upvote("U1", "hello").await.unwrap(), UpsertOutcome::Upvoted);

        let rows = db.by_user("U1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 3);
    }

    #[tokio::test]
    async fn insert_or_upvote_of_zero_score_row_is_an_upvote() {
        let db = store().await;

        db.insert("U1", "m", 0).await.unwrap();

        assert_eq!(db.insert_or_upvote("U1", "m").await.unwrap(), UpsertOutcome::Upvoted);

        let rows = db.by_user("U1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 1);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_bounded() {
        let db = store().await;

        for message in ["one", "two", "three", "four"] {
            db.insert("U1", message, 1).await.unwrap();
        }

        let rows = db.recent(3).await.unwrap();
        let messages: Vec<_> = rows.iter().map(|l| l.message.as_str()).collect();

        assert_eq!(messages, vec!["four", "three", "two"]);
    }

    #[tokio::test]
    async fn top_is_highest_score_first() {
        let db = store().await;

        db.insert("U1", "low", 1).await.unwrap();
        db.insert("U1", "high", 9).await.unwrap();
        db.insert("U2", "mid", 4).await.unwrap();
        db.insert("U2", "lowest", 0).await.unwrap();

        let rows = db.top(3).await.unwrap();
        let scores: Vec<_> = rows.iter().map(|l| l.score).collect();

        assert_eq!(scores, vec![9, 4, 1]);
    }

    #[tokio::test]
    async fn random_returns_at_most_one() {
        let db = store().await;

        assert!(db.random(1).await.unwrap().is_empty());

        db.insert("U1", "one", 1).await.unwrap();
        db.insert("U1", "two", 1).await.unwrap();

        assert_eq!(db.random(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_ignores_case() {
        let db = store().await;

        db.insert("U1", "foo bar", 1).await.unwrap();
        db.insert("U1", "Foo baz", 1).await.unwrap();
        db.insert("U2", "LOUD FOO", 1).await.unwrap();
        db.insert("U2", "nothing here", 1).await.unwrap();

        let rows = db.search("foo").await.unwrap();
        assert_eq!(rows.len(), 3);

        let rows = db.search("FOO B").await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn by_user_filters_on_author() {
        let db = store().await;

        db.insert("U1", "mine", 1).await.unwrap();
        db.insert("U2", "theirs", 1).await.unwrap();

        let rows = db.by_user("U1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "mine");
        assert_eq!(rows[0].author_id, "U1");
    }

    #[tokio::test]
    async fn highscores_sum_per_author() {
        let db = store().await;

        db.insert("U1", "a", 2).await.unwrap();
        db.insert("U1", "b", 3).await.unwrap();
        db.insert("U2", "c", 7).await.unwrap();

        let rows = db.highscores().await.unwrap();

        assert_eq!(
            rows,
            vec![
                Highscore { author_id: "U2".to_string(), score: 7 },
                Highscore { author_id: "U1".to_string(), score: 5 },
            ]
        );
    }
}
