use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::store::{Execution, StepRun, Store, WorkflowRecord};
use crate::workflow::{ExecutionStatus, StepRunStatus};
use crate::{Error, Result};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(path: &str) -> Result<Self> {
        info!("Connecting to SQLite database: {}", path);

        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);

        // An in-memory database lives and dies with its connection, so pin
        // the pool to one long-lived connection in that case.
        let pool_options = if path.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            error!("Failed to connect to SQLite: {}", e);
            Error::Sqlx(e)
        })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    // Workflow definition operations
    async fn save_workflow(&self, workflow: &WorkflowRecord) -> Result<()> {
        debug!("Saving workflow: {}", workflow.id);

        let steps_json = serde_json::to_string(&workflow.steps)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, tenant_id, name, steps, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                steps = excluded.steps,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(workflow.tenant_id.to_string())
        .bind(&workflow.name)
        .bind(steps_json)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_workflow(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<WorkflowRecord>> {
        debug!("Getting workflow: {}", id);

        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, name, steps, created_at, updated_at
            FROM workflows
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn list_workflows(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, name, steps, created_at, updated_at
            FROM workflows
            WHERE tenant_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(workflow_from_row).collect()
    }

    // Execution operations
    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        debug!("Creating execution: {}", execution.id);

        sqlx::query(
            r#"
            INSERT INTO executions (
                id, tenant_id, workflow_id, status, input, variables, error,
                started_at, finished_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.tenant_id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.status.to_string())
        .bind(serde_json::to_string(&execution.input)?)
        .bind(serde_json::to_string(&execution.variables)?)
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_execution(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Execution>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, workflow_id, status, input, variables, error,
                   started_at, finished_at, created_at
            FROM executions
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(execution_from_row).transpose()
    }

    async fn complete_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: ExecutionStatus,
        variables: JsonValue,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        debug!("Completing execution {} as {}", id, status);

        // The status guard keeps the terminal update idempotent: a terminal
        // execution is never overwritten.
        sqlx::query(
            r#"
            UPDATE executions
            SET status = ?1, variables = ?2, error = ?3, finished_at = ?4
            WHERE id = ?5 AND tenant_id = ?6 AND status = 'running'
            "#,
        )
        .bind(status.to_string())
        .bind(serde_json::to_string(&variables)?)
        .bind(error)
        .bind(finished_at)
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_executions(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Execution>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, workflow_id, status, input, variables, error,
                   started_at, finished_at, created_at
            FROM executions
            WHERE tenant_id = ?1 AND workflow_id = ?2
            ORDER BY started_at DESC
            LIMIT ?3
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(workflow_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(execution_from_row).collect()
    }

    // Step run operations
    async fn create_step_run(&self, run: &StepRun) -> Result<()> {
        debug!("Creating step run {} for step {}", run.id, run.step_id);

        sqlx::query(
            r#"
            INSERT INTO step_runs (
                id, execution_id, tenant_id, step_id, step_name, step_path,
                status, error, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.execution_id.to_string())
        .bind(run.tenant_id.to_string())
        .bind(&run.step_id)
        .bind(&run.step_name)
        .bind(&run.step_path)
        .bind(run.status.to_string())
        .bind(&run.error)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_step_run(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: StepRunStatus,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE step_runs
            SET status = ?1, error = ?2, finished_at = ?3
            WHERE id = ?4 AND tenant_id = ?5 AND status = 'running'
            "#,
        )
        .bind(status.to_string())
        .bind(error)
        .bind(finished_at)
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_step_runs(&self, tenant_id: Uuid, execution_id: Uuid) -> Result<Vec<StepRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, execution_id, tenant_id, step_id, step_name, step_path,
                   status, error, started_at, finished_at
            FROM step_runs
            WHERE tenant_id = ?1 AND execution_id = ?2
            ORDER BY started_at
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(step_run_from_row).collect()
    }
}

fn workflow_from_row(r: &SqliteRow) -> Result<WorkflowRecord> {
    Ok(WorkflowRecord {
        id: r.get::<String, _>("id").parse()?,
        tenant_id: r.get::<String, _>("tenant_id").parse()?,
        name: r.get("name"),
        steps: serde_json::from_str(r.get("steps"))?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn execution_from_row(r: &SqliteRow) -> Result<Execution> {
    Ok(Execution {
        id: r.get::<String, _>("id").parse()?,
        tenant_id: r.get::<String, _>("tenant_id").parse()?,
        workflow_id: r.get::<String, _>("workflow_id").parse()?,
        status: r.get::<String, _>("status").parse()?,
        input: serde_json::from_str(r.get("input"))?,
        variables: serde_json::from_str(r.get("variables"))?,
        error: r.get("error"),
        started_at: r.get("started_at"),
        finished_at: r.get("finished_at"),
        created_at: r.get("created_at"),
    })
}

fn step_run_from_row(r: &SqliteRow) -> Result<StepRun> {
    Ok(StepRun {
        id: r.get::<String, _>("id").parse()?,
        execution_id: r.get::<String, _>("execution_id").parse()?,
        tenant_id: r.get::<String, _>("tenant_id").parse()?,
        step_id: r.get("step_id"),
        step_name: r.get("step_name"),
        step_path: r.get("step_path"),
        status: r.get::<String, _>("status").parse()?,
        error: r.get("error"),
        started_at: r.get("started_at"),
        finished_at: r.get("finished_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteStore {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.init().await.unwrap();
        store
    }

    fn execution(tenant_id: Uuid, workflow_id: Uuid) -> Execution {
        Execution {
            id: Uuid::new_v4(),
            tenant_id,
            workflow_id,
            status: ExecutionStatus::Running,
            input: json!({"reason": "test"}),
            variables: json!({}),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn execution_round_trips() {
        let store = store().await;
        let tenant_id = Uuid::new_v4();
        let exec = execution(tenant_id, Uuid::new_v4());
        store.create_execution(&exec).await.unwrap();

        let loaded = store.get_execution(tenant_id, exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, exec.id);
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(loaded.input, json!({"reason": "test"}));
    }

    #[tokio::test]
    async fn reads_are_tenant_scoped() {
        let store = store().await;
        let tenant_id = Uuid::new_v4();
        let exec = execution(tenant_id, Uuid::new_v4());
        store.create_execution(&exec).await.unwrap();

        let other_tenant = Uuid::new_v4();
        assert!(store.get_execution(other_tenant, exec.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn terminal_status_is_written_once() {
        let store = store().await;
        let tenant_id = Uuid::new_v4();
        let exec = execution(tenant_id, Uuid::new_v4());
        store.create_execution(&exec).await.unwrap();

        store
            .complete_execution(
                tenant_id,
                exec.id,
                ExecutionStatus::Failed,
                json!({}),
                Some("boom".to_string()),
                Utc::now(),
            )
            .await
            .unwrap();

        // A second terminal write must not overwrite the first.
        store
            .complete_execution(tenant_id, exec.id, ExecutionStatus::Completed, json!({}), None, Utc::now())
            .await
            .unwrap();

        let loaded = store.get_execution(tenant_id, exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn step_runs_list_in_start_order() {
        let store = store().await;
        let tenant_id = Uuid::new_v4();
        let execution_id = Uuid::new_v4();

        for (i, step_id) in ["first", "second", "third"].iter().enumerate() {
            let run = StepRun {
                id: Uuid::new_v4(),
                execution_id,
                tenant_id,
                step_id: step_id.to_string(),
                step_name: format!("step {i}"),
                step_path: String::new(),
                status: StepRunStatus::Running,
                error: None,
                started_at: Utc::now() + chrono::Duration::milliseconds(i as i64),
                finished_at: None,
            };
            store.create_step_run(&run).await.unwrap();
        }

        let runs = store.list_step_runs(tenant_id, execution_id).await.unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }
}
