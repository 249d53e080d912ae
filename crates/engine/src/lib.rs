pub mod config;
pub mod email;
pub mod entities;
pub mod metrics;
pub mod notify;
pub mod store;
pub mod workflow;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(uuid::Uuid),
    #[error("Unknown step kind: {0}")]
    UnknownStepKind(String),
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),
    #[error("Action {action} is missing parameters: {detail}")]
    MissingParameters { action: String, detail: String },
    #[error("Unsupported entity: {0}")]
    UnsupportedEntity(String),
    #[error("Variable {0} does not hold an array")]
    NotAnArray(String),
    #[error("Webhook failed with {status} {text}")]
    WebhookFailed { status: u16, text: String },
    #[error("Invalid step {step_id}: {detail}")]
    InvalidStep { step_id: String, detail: String },
    #[error("Execution cancelled")]
    Cancelled,
    #[error("Execution deadline exceeded")]
    DeadlineExceeded,
    #[error("Email transport error: {0}")]
    Email(String),
    #[error("Notification delivery error: {0}")]
    Notify(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
