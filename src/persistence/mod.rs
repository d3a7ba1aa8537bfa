//! Persistence layer for run session history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteSessionStore;

use crate::core::{RunSession, RunStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a stored run session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,

    pub pipeline_name: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,

    /// Number of completed iterations
    pub iterations: usize,

    /// Markers passing in the last iteration
    pub markers_passed: usize,

    pub markers_total: usize,

    pub cost_usd: f64,

    pub error: Option<String>,
}

impl SessionSummary {
    pub fn from_session(session: &RunSession) -> Self {
        let (markers_passed, markers_total) = session
            .iterations
            .last()
            .map(|it| (it.passed_count(), it.marker_results.len()))
            .unwrap_or((0, 0));

        Self {
            session_id: session.id,
            pipeline_name: session.pipeline_name.clone(),
            status: session.status,
            started_at: session.started_at,
            ended_at: session.ended_at,
            iterations: session.iterations.len(),
            markers_passed,
            markers_total,
            cost_usd: session.usage.cost_usd,
            error: session.error.clone(),
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or replace) a session record
    async fn save_session(&self, session: &RunSession) -> Result<()>;

    /// Load a full session record by ID
    async fn load_session(&self, session_id: Uuid) -> Result<Option<RunSession>>;

    /// Sessions of one pipeline, newest first
    async fn list_sessions(&self, pipeline_name: &str) -> Result<Vec<SessionSummary>>;

    /// All pipeline names with stored sessions
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    sessions: RwLock<HashMap<Uuid, RunSession>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_session(&self, session: &RunSession) -> Result<()> {
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<RunSession>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn list_sessions(&self, pipeline_name: &str) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.pipeline_name == pipeline_name)
            .map(SessionSummary::from_session)
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let sessions = self.sessions.read().await;
        let mut names: Vec<String> = sessions.values().map(|s| s.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
