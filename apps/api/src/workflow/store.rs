//! Workflow persistence. The orchestrator never sees the store; the service
//! loads a context, runs a step on it and writes it back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::workflow::context::WorkflowContext;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored workflow could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, workflow_id: Uuid) -> Result<Option<WorkflowContext>, StoreError>;

    /// Inserts or replaces the whole context.
    async fn put(&self, ctx: &WorkflowContext) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<WorkflowContext>, StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<Uuid, WorkflowContext>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get(&self, workflow_id: Uuid) -> Result<Option<WorkflowContext>, StoreError> {
        Ok(self.workflows.read().await.get(&workflow_id).cloned())
    }

    async fn put(&self, ctx: &WorkflowContext) -> Result<(), StoreError> {
        self.workflows
            .write()
            .await
            .insert(ctx.workflow_id, ctx.clone());
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<WorkflowContext>, StoreError> {
        let mut found: Vec<WorkflowContext> = self
            .workflows
            .read()
            .await
            .values()
            .filter(|ctx| ctx.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|ctx| ctx.created_at);
        Ok(found)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    id          UUID PRIMARY KEY,
    user_id     UUID NOT NULL,
    state       TEXT NOT NULL,
    document    JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS workflows_user_id_idx ON workflows (user_id, created_at)";

#[derive(Debug, FromRow)]
struct WorkflowRow {
    document: Json<WorkflowContext>,
}

/// One JSONB document per workflow. `state` and the timestamps are copied into
/// columns for querying; the document is the source of truth.
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_USER_INDEX).execute(&self.pool).await?;
        info!("Workflow table ready");
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn get(&self, workflow_id: Uuid) -> Result<Option<WorkflowContext>, StoreError> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT document FROM workflows WHERE id = $1")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.document.0))
    }

    async fn put(&self, ctx: &WorkflowContext) -> Result<(), StoreError> {
        let updated_at: DateTime<Utc> = ctx.updated_at();
        sqlx::query(
            r#"
            INSERT INTO workflows (id, user_id, state, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(ctx.workflow_id)
        .bind(ctx.user_id)
        .bind(ctx.state().as_str())
        .bind(Json(ctx))
        .bind(ctx.created_at)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<WorkflowContext>, StoreError> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            "SELECT document FROM workflows WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.document.0).collect())
    }
}
