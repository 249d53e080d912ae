pub mod context;
pub mod definition;
pub mod engine;
pub mod executor;
pub mod interpreter;
pub mod state;

pub use context::VariableContext;
pub use definition::{
    ActionConfig, CompareOp, ConditionConfig, CreateRecordParams, DelayConfig, LoopConfig, RawStep,
    SendEmailParams, SendNotificationParams, Step, StepConfig, UpdateRecordParams, WebhookConfig,
    WorkflowDefinition,
};
pub use engine::{RunContext, RunControl, WorkflowEngine};
pub use executor::StepExecutor;
pub use interpreter::{StepInterpreter, StepScope};
pub use state::{ExecutionStatus, StepRunStatus};
