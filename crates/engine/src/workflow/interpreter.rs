use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::store::{StepRun, Store};
use crate::workflow::definition::{LoopConfig, Step, StepConfig};
use crate::workflow::engine::{RunContext, RunControl};
use crate::workflow::executor::StepExecutor;
use crate::workflow::state::StepRunStatus;
use crate::workflow::VariableContext;
use crate::{Error, Result};

/// Where in the step tree a dispatch happens: the owning execution plus the
/// chain of enclosing loop iterations.
#[derive(Debug, Clone)]
pub struct StepScope {
    pub execution_id: Uuid,
    pub tenant_id: Uuid,
    frames: Vec<(String, u64)>,
}

impl StepScope {
    pub fn root(execution_id: Uuid, tenant_id: Uuid) -> Self {
        Self {
            execution_id,
            tenant_id,
            frames: Vec::new(),
        }
    }

    fn enter(&self, step_id: &str, iteration: u64) -> Self {
        let mut scope = self.clone();
        scope.frames.push((step_id.to_string(), iteration));
        scope
    }

    /// The enclosing loop chain rendered as `"outer[1]/inner[0]"`; empty for
    /// top-level steps.
    pub fn path(&self) -> String {
        self.frames
            .iter()
            .map(|(step_id, iteration)| format!("{step_id}[{iteration}]"))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Walks a step list in declared order, recording one StepRun around every
/// dispatch. The first failure stops the list and propagates.
pub struct StepInterpreter {
    store: Arc<dyn Store>,
    executor: StepExecutor,
}

impl StepInterpreter {
    pub fn new(store: Arc<dyn Store>, executor: StepExecutor) -> Self {
        Self { store, executor }
    }

    /// Run `steps` in order. Consumed at the top level by the orchestrator
    /// and recursively by loop bodies, which is why the future is boxed.
    ///
    /// `next_step_id`/`condition_step_id` on the steps are never consulted.
    pub fn run_steps<'a>(
        &'a self,
        steps: &'a [Step],
        scope: &'a StepScope,
        run: &'a RunContext,
        vars: &'a mut VariableContext,
        control: &'a RunControl,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for step in steps {
                control.check()?;

                let step_run = StepRun {
                    id: Uuid::new_v4(),
                    execution_id: scope.execution_id,
                    tenant_id: scope.tenant_id,
                    step_id: step.id.clone(),
                    step_name: step.name.clone(),
                    step_path: scope.path(),
                    status: StepRunStatus::Running,
                    error: None,
                    started_at: Utc::now(),
                    finished_at: None,
                };
                self.store.create_step_run(&step_run).await?;
                info!(step = %step.id, "executing step");

                match self.dispatch(step, scope, run, vars, control).await {
                    Ok(()) => {
                        self.store
                            .complete_step_run(
                                scope.tenant_id,
                                step_run.id,
                                StepRunStatus::Completed,
                                None,
                                Utc::now(),
                            )
                            .await?;
                        metrics::STEPS_EXECUTED.inc();
                    }
                    Err(e) => {
                        error!(step = %step.id, error = %e, "step failed");
                        self.store
                            .complete_step_run(
                                scope.tenant_id,
                                step_run.id,
                                StepRunStatus::Failed,
                                Some(e.to_string()),
                                Utc::now(),
                            )
                            .await?;
                        return Err(e);
                    }
                }
            }

            Ok(())
        })
    }

    async fn dispatch(
        &self,
        step: &Step,
        scope: &StepScope,
        run: &RunContext,
        vars: &mut VariableContext,
        control: &RunControl,
    ) -> Result<()> {
        match &step.config {
            StepConfig::Condition(config) => self.executor.run_condition(&step.id, config, vars),
            StepConfig::Action(config) => self.executor.run_action(config, run).await,
            StepConfig::Loop(config) => self.run_loop(step, config, scope, run, vars, control).await,
            StepConfig::Delay(config) => self.executor.run_delay(config, control).await,
            StepConfig::Webhook(config) => self.executor.run_webhook(&step.id, config, vars).await,
        }
    }

    /// Iterate over a resolved collection, bounded by `max_iterations`.
    /// Every iteration shares the run's variable context; `current_index`
    /// and `current_item` are plain variables visible to the outer scope
    /// after the loop finishes.
    async fn run_loop(
        &self,
        step: &Step,
        config: &LoopConfig,
        scope: &StepScope,
        run: &RunContext,
        vars: &mut VariableContext,
        control: &RunControl,
    ) -> Result<()> {
        let items = match vars.resolve_path(&config.collection) {
            Some(Value::Array(items)) => items.clone(),
            _ => return Err(Error::NotAnArray(config.collection.clone())),
        };

        let rounds = items.len().min(config.max_iterations as usize);
        info!(step = %step.id, rounds, "entering loop");

        for (iteration, item) in items.into_iter().take(rounds).enumerate() {
            vars.set("current_index", json!(iteration));
            vars.set("current_item", item);

            let scope = scope.enter(&step.id, iteration as u64);
            self.run_steps(&config.steps, &scope, run, vars, control).await?;
        }

        Ok(())
    }
}
