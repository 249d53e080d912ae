use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::workflow::{ExecutionStatus, StepRunStatus};

/// A stored workflow definition row. `steps` holds the raw step array as
/// JSON; validation into typed configs happens when a run loads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub steps: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One run of a workflow. Created running; receives exactly one terminal
/// update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,

    // Snapshots
    pub input: JsonValue,
    pub variables: JsonValue,
    pub error: Option<String>,

    // Timing
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The audit record of one step dispatch within one execution. `step_path`
/// attributes runs inside loop bodies to their parent step and iteration,
/// e.g. `"sync-items[2]"`; top-level runs carry an empty path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub tenant_id: Uuid,
    pub step_id: String,
    pub step_name: String,
    pub step_path: String,
    pub status: StepRunStatus,
    pub error: Option<String>,

    // Timing
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
