mod config;
mod factory;
mod models;
mod postgres;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::create_store;
pub use models::*;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::workflow::{ExecutionStatus, StepRunStatus};

/// Durable storage for workflow definitions and the execution audit trail.
/// Every operation is scoped by tenant.
#[async_trait]
pub trait Store: Send + Sync {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;

    // Workflow definition operations
    async fn save_workflow(&self, workflow: &WorkflowRecord) -> crate::Result<()>;
    async fn get_workflow(&self, tenant_id: Uuid, id: Uuid) -> crate::Result<Option<WorkflowRecord>>;
    async fn list_workflows(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> crate::Result<Vec<WorkflowRecord>>;

    // Execution operations
    async fn create_execution(&self, execution: &Execution) -> crate::Result<()>;
    async fn get_execution(&self, tenant_id: Uuid, id: Uuid) -> crate::Result<Option<Execution>>;
    async fn complete_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: ExecutionStatus,
        variables: JsonValue,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> crate::Result<()>;
    async fn list_executions(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        limit: i64,
    ) -> crate::Result<Vec<Execution>>;

    // Step run operations
    async fn create_step_run(&self, run: &StepRun) -> crate::Result<()>;
    async fn complete_step_run(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: StepRunStatus,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> crate::Result<()>;
    async fn list_step_runs(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> crate::Result<Vec<StepRun>>;
}
