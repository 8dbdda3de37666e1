//! Run ledger: stage transitions, decision tokens, published posts, seen
//! articles, and the single-flight run lock. SQLite is the only durable
//! state the pipeline keeps.

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};
use std::str::FromStr;
use tokio::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{Draft, PublishedPost};
use crate::TARGET_DB;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self, sqlx::Error> {
        info!(target: TARGET_DB, "Creating database pool for: {}", database_path);

        let connect_options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", database_path))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5))
                .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;

        let db = Database { pool };
        db.initialize_schema().await?;
        Ok(db)
    }

    async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                outcome TEXT,
                detail TEXT
            );

            CREATE TABLE IF NOT EXISTS run_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                at TEXT NOT NULL,
                state TEXT NOT NULL,
                detail TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_run_events_run_id ON run_events (run_id);

            CREATE TABLE IF NOT EXISTS decision_tokens (
                token TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                issued_at TEXT NOT NULL,
                decision TEXT,
                decided_at TEXT
            );

            CREATE TABLE IF NOT EXISTS approved_drafts (
                token TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                approved_at TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                draft_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS published_posts (
                token TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                platform_post_id TEXT NOT NULL,
                published_at TEXT NOT NULL,
                chosen_format TEXT NOT NULL,
                twitter_text TEXT NOT NULL,
                image_path TEXT
            );

            CREATE TABLE IF NOT EXISTS seen_articles (
                url TEXT PRIMARY KEY,
                seen_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS run_lock (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                run_id TEXT NOT NULL,
                acquired_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn begin_run(&self, run_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO runs (run_id, started_at) VALUES (?1, ?2)")
            .bind(run_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn finish_run(
        &self,
        run_id: Uuid,
        outcome: &str,
        detail: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE runs SET finished_at = ?1, outcome = ?2, detail = ?3 WHERE run_id = ?4",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(outcome)
        .bind(detail)
        .bind(run_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Appends one stage transition to the audit trail.
    pub async fn record_event(
        &self,
        run_id: Uuid,
        state: &str,
        detail: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO run_events (run_id, at, state, detail) VALUES (?1, ?2, ?3, ?4)")
            .bind(run_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(state)
            .bind(detail)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn has_seen(&self, url: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM seen_articles WHERE url = ?1")
            .bind(url)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn mark_seen(&self, url: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO seen_articles (url, seen_at) VALUES (?1, ?2)")
            .bind(url)
            .bind(Utc::now().to_rfc3339())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn record_token(&self, run_id: Uuid, token: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO decision_tokens (token, run_id, issued_at) VALUES (?1, ?2, ?3)")
            .bind(token.to_string())
            .bind(run_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn record_decision(&self, token: Uuid, decision: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE decision_tokens SET decision = ?1, decided_at = ?2 WHERE token = ?3",
        )
        .bind(decision)
        .bind(Utc::now().to_rfc3339())
        .bind(token.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Persists the approved draft before the platform call, so a publish
    /// failure never silently loses what the reviewer signed off on.
    pub async fn record_approved_draft(
        &self,
        run_id: Uuid,
        token: Uuid,
        draft: &Draft,
    ) -> Result<(), sqlx::Error> {
        let draft_json = serde_json::to_string(draft).unwrap_or_default();
        sqlx::query(
            "INSERT OR IGNORE INTO approved_drafts (token, run_id, approved_at, fingerprint, draft_json) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(token.to_string())
        .bind(run_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(draft.fingerprint())
        .bind(draft_json)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// The publish-once marker for a decision token.
    pub async fn is_published(&self, token: Uuid) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM published_posts WHERE token = ?1")
            .bind(token.to_string())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn record_published(
        &self,
        run_id: Uuid,
        token: Uuid,
        post: &PublishedPost,
        image_path: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO published_posts \
             (token, run_id, platform_post_id, published_at, chosen_format, twitter_text, image_path) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(token.to_string())
        .bind(run_id.to_string())
        .bind(&post.platform_post_id)
        .bind(post.published_at.to_rfc3339())
        .bind(post.draft_format.label())
        .bind(&post.twitter_text)
        .bind(image_path)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Acquires the single-flight lock. Returns false when another run still
    /// holds it; an expired lock from a crashed process is swept first.
    pub async fn acquire_run_lock(&self, run_id: Uuid, ttl: Duration) -> Result<bool, sqlx::Error> {
        let now = Utc::now().timestamp();

        let swept = sqlx::query("DELETE FROM run_lock WHERE id = 1 AND expires_at <= ?1")
            .bind(now)
            .execute(self.pool())
            .await?;
        if swept.rows_affected() > 0 {
            warn!(target: TARGET_DB, "Swept an expired run lock from a previous process");
        }

        let inserted = sqlx::query(
            "INSERT INTO run_lock (id, run_id, acquired_at, expires_at) VALUES (1, ?1, ?2, ?3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(run_id.to_string())
        .bind(now)
        .bind(now + ttl.as_secs() as i64)
        .execute(self.pool())
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    pub async fn release_run_lock(&self, run_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM run_lock WHERE id = 1 AND run_id = ?1")
            .bind(run_id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::PostFormat;

    async fn memory_db() -> Database {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            // A single connection so the in-memory database is shared.
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .unwrap();
        let db = Database { pool };
        db.initialize_schema().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_seen_articles_round_trip() {
        let db = memory_db().await;
        assert!(!db.has_seen("https://a.example/1").await.unwrap());
        db.mark_seen("https://a.example/1").await.unwrap();
        assert!(db.has_seen("https://a.example/1").await.unwrap());
        // Marking twice is harmless.
        db.mark_seen("https://a.example/1").await.unwrap();
    }

    #[tokio::test]
    async fn test_run_lock_is_single_flight() {
        let db = memory_db().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert!(db
            .acquire_run_lock(first, Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!db
            .acquire_run_lock(second, Duration::from_secs(60))
            .await
            .unwrap());

        db.release_run_lock(first).await.unwrap();
        assert!(db
            .acquire_run_lock(second, Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_lock_is_swept() {
        let db = memory_db().await;
        let stale = Uuid::new_v4();
        assert!(db
            .acquire_run_lock(stale, Duration::from_secs(0))
            .await
            .unwrap());
        // TTL of zero expires immediately; the next acquirer sweeps it.
        let fresh = Uuid::new_v4();
        assert!(db
            .acquire_run_lock(fresh, Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_publish_marker_per_token() {
        let db = memory_db().await;
        let run_id = Uuid::new_v4();
        let token = Uuid::new_v4();
        db.begin_run(run_id).await.unwrap();
        db.record_token(run_id, token).await.unwrap();
        assert!(!db.is_published(token).await.unwrap());

        let post = PublishedPost {
            platform_post_id: "190000000".to_string(),
            published_at: Utc::now(),
            draft_format: PostFormat::DevastatingNewsThread,
            twitter_text: "Thread 1/4".to_string(),
        };
        db.record_published(run_id, token, &post, None).await.unwrap();
        assert!(db.is_published(token).await.unwrap());
    }
}
