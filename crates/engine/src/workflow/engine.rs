use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::store::{Execution, Store};
use crate::workflow::definition::WorkflowDefinition;
use crate::workflow::executor::StepExecutor;
use crate::workflow::interpreter::{StepInterpreter, StepScope};
use crate::workflow::state::ExecutionStatus;
use crate::workflow::VariableContext;
use crate::{Error, Result};

/// Per-run inputs: who runs the workflow and with what data.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub input: Value,
    pub variables: Map<String, Value>,
}

/// Cancellation and deadline for one run, checked between steps and inside
/// the delay suspension.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Suspend for `duration`, waking early when cancelled or when the run
    /// deadline falls inside the window.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        let wake = Instant::now() + duration;
        let capped = match self.deadline {
            Some(deadline) if deadline < wake => deadline,
            _ => wake,
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(capped)) => {
                if capped < wake {
                    Err(Error::DeadlineExceeded)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Orchestrates one execution: load the definition, open the audit record,
/// drive the interpreter, close the record exactly once.
pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    interpreter: StepInterpreter,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn Store>, executor: StepExecutor) -> Self {
        Self {
            interpreter: StepInterpreter::new(store.clone(), executor),
            store,
        }
    }

    /// Run a stored workflow to its terminal state and return the execution
    /// id. A missing or invalid definition fails before any execution record
    /// is created; every later failure is recorded on the execution before
    /// it propagates.
    pub async fn run(
        &self,
        workflow_id: Uuid,
        run: RunContext,
        control: RunControl,
    ) -> Result<Uuid> {
        let record = self
            .store
            .get_workflow(run.tenant_id, workflow_id)
            .await?
            .ok_or(Error::WorkflowNotFound(workflow_id))?;
        let definition = WorkflowDefinition::from_record(&record)?;
        info!(workflow = %definition.name, steps = definition.steps.len(), "starting workflow run");

        let execution = Execution {
            id: Uuid::new_v4(),
            tenant_id: run.tenant_id,
            workflow_id,
            status: ExecutionStatus::Running,
            input: run.input.clone(),
            variables: Value::Object(run.variables.clone()),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            created_at: Utc::now(),
        };
        self.store.create_execution(&execution).await?;
        metrics::EXECUTIONS_STARTED.inc();

        let mut vars = VariableContext::from_map(run.variables.clone());
        let scope = StepScope::root(execution.id, run.tenant_id);

        match self
            .interpreter
            .run_steps(&definition.steps, &scope, &run, &mut vars, &control)
            .await
        {
            Ok(()) => {
                self.store
                    .complete_execution(
                        run.tenant_id,
                        execution.id,
                        ExecutionStatus::Completed,
                        vars.snapshot(),
                        None,
                        Utc::now(),
                    )
                    .await?;
                metrics::EXECUTIONS_COMPLETED.inc();
                info!(execution = %execution.id, "workflow run completed");
                Ok(execution.id)
            }
            Err(e) => {
                self.store
                    .complete_execution(
                        run.tenant_id,
                        execution.id,
                        ExecutionStatus::Failed,
                        vars.snapshot(),
                        Some(e.to_string()),
                        Utc::now(),
                    )
                    .await?;
                metrics::EXECUTIONS_FAILED.inc();
                error!(execution = %execution.id, error = %e, "workflow run failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_control_passes_checks() {
        assert!(RunControl::new().check().is_ok());
    }

    #[test]
    fn cancelled_token_fails_check() {
        let token = CancellationToken::new();
        token.cancel();
        let control = RunControl::with_token(token);
        assert!(matches!(control.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn expired_deadline_fails_check() {
        let control = RunControl::with_deadline(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(control.check(), Err(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn sleep_is_capped_by_deadline() {
        let control = RunControl::with_deadline(Duration::from_millis(20));
        let started = Instant::now();
        let result = control.sleep(Duration::from_secs(30)).await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn sleep_wakes_on_cancellation() {
        let token = CancellationToken::new();
        let control = RunControl::with_token(token.clone());
        token.cancel();
        assert!(matches!(
            control.sleep(Duration::from_secs(30)).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn short_sleep_completes() {
        let control = RunControl::new();
        assert!(control.sleep(Duration::from_millis(5)).await.is_ok());
    }
}
