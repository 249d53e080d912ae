use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref EXECUTIONS_STARTED: IntCounter = register_int_counter!(
        "opsflow_executions_started_total",
        "Total number of workflow executions started."
    )
    .unwrap();
    pub static ref EXECUTIONS_COMPLETED: IntCounter = register_int_counter!(
        "opsflow_executions_completed_total",
        "Total number of workflow executions that completed."
    )
    .unwrap();
    pub static ref EXECUTIONS_FAILED: IntCounter = register_int_counter!(
        "opsflow_executions_failed_total",
        "Total number of workflow executions that failed."
    )
    .unwrap();
    pub static ref STEPS_EXECUTED: IntCounter = register_int_counter!(
        "opsflow_steps_executed_total",
        "Total number of workflow steps executed."
    )
    .unwrap();
}

pub fn register_metrics() {
    for counter in [
        EXECUTIONS_STARTED.clone(),
        EXECUTIONS_COMPLETED.clone(),
        EXECUTIONS_FAILED.clone(),
        STEPS_EXECUTED.clone(),
    ] {
        REGISTRY
            .register(Box::new(counter))
            .expect("Failed to register workflow metric");
    }
}

// Gather metrics for exposition by the host application.
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}
