//! SQLite-based session store

use crate::core::{RunSession, RunStatus};
use crate::persistence::{PersistenceBackend, SessionSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        pipeline_name TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        ended_at TEXT,
        iterations INTEGER NOT NULL DEFAULT 0,
        markers_passed INTEGER NOT NULL DEFAULT 0,
        markers_total INTEGER NOT NULL DEFAULT 0,
        cost_usd REAL NOT NULL DEFAULT 0.0,
        error TEXT,
        record TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_pipeline ON sessions(pipeline_name)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at)",
];

/// SQLite session store
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (creating if needed) a store at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("healing-pipeline");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::new(db_dir.join("sessions.db")).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn status_name(status: RunStatus) -> &'static str {
        match status {
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Aborted => "Aborted",
        }
    }

    fn parse_status(name: &str) -> RunStatus {
        match name {
            "Succeeded" => RunStatus::Succeeded,
            "Failed" => RunStatus::Failed,
            "Aborted" => RunStatus::Aborted,
            _ => RunStatus::Running,
        }
    }

    fn summary_from_row(row: &SqliteRow) -> Result<SessionSummary> {
        Ok(SessionSummary {
            session_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            status: Self::parse_status(&row.get::<String, _>("status")),
            started_at: Self::from_naive(row.get("started_at")),
            ended_at: row.get::<Option<NaiveDateTime>, _>("ended_at").map(Self::from_naive),
            iterations: row.get::<i64, _>("iterations") as usize,
            markers_passed: row.get::<i64, _>("markers_passed") as usize,
            markers_total: row.get::<i64, _>("markers_total") as usize,
            cost_usd: row.get("cost_usd"),
            error: row.get("error"),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteSessionStore {
    async fn save_session(&self, session: &RunSession) -> Result<()> {
        let summary = SessionSummary::from_session(session);
        let record = serde_json::to_string(session).context("Failed to serialize session")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sessions
            (id, pipeline_name, status, started_at, ended_at, iterations, markers_passed, markers_total, cost_usd, error, record)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(summary.session_id.to_string())
        .bind(&summary.pipeline_name)
        .bind(Self::status_name(summary.status))
        .bind(Self::to_naive(summary.started_at))
        .bind(summary.ended_at.map(Self::to_naive))
        .bind(summary.iterations as i64)
        .bind(summary.markers_passed as i64)
        .bind(summary.markers_total as i64)
        .bind(summary.cost_usd)
        .bind(&summary.error)
        .bind(record)
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;

        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<RunSession>> {
        let row = sqlx::query("SELECT record FROM sessions WHERE id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load session")?;

        row.map(|row| {
            let record: String = row.get("record");
            serde_json::from_str(&record).context("Stored session record is corrupt")
        })
        .transpose()
    }

    async fn list_sessions(&self, pipeline_name: &str) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pipeline_name, status, started_at, ended_at, iterations, markers_passed, markers_total, cost_usd, error
            FROM sessions
            WHERE pipeline_name = ?1
            ORDER BY started_at DESC
            "#,
        )
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM sessions
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::new(dir.path().join("sessions.db")).await.unwrap();

        let mut session = RunSession::new("test-pipeline");
        session.record_transcript("prompt".to_string(), "response".to_string());
        session.usage.cost_usd = 0.42;
        session.finish(RunStatus::Aborted);

        store.save_session(&session).await.unwrap();

        let loaded = store.load_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.pipeline_name, "test-pipeline");
        assert_eq!(loaded.status, RunStatus::Aborted);
        assert_eq!(loaded.transcript.len(), 1);

        let summaries = store.list_sessions("test-pipeline").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, RunStatus::Aborted);
        assert!((summaries[0].cost_usd - 0.42).abs() < 1e-9);

        assert_eq!(store.list_pipelines().await.unwrap(), vec!["test-pipeline"]);
        assert!(store.load_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::new(dir.path().join("sessions.db")).await.unwrap();

        let mut session = RunSession::new("p");
        store.save_session(&session).await.unwrap();
        session.finish(RunStatus::Succeeded);
        store.save_session(&session).await.unwrap();

        let summaries = store.list_sessions("p").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, RunStatus::Succeeded);
    }
}
