//! CLI entry point: run one stored workflow to its terminal state.
//!
//! Run with: cargo run --bin opsflow-engine -- --workflow-id <id> --tenant-id <id> --user-id <id>

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use opsflow_engine::{
    config::Config,
    email::{Mailer, SmtpMailer},
    entities::EntityRegistry,
    metrics,
    notify::{HttpNotifier, Notifier},
    store::create_store,
    workflow::{RunContext, RunControl, StepExecutor, WorkflowEngine},
};

#[derive(Parser, Debug)]
#[command(name = "opsflow-engine", about = "Run a stored workflow against the audit store", long_about = None)]
struct Args {
    /// Workflow to execute
    #[arg(long)]
    workflow_id: Uuid,

    /// Owning tenant
    #[arg(long)]
    tenant_id: Uuid,

    /// Acting user, recorded on execution writes
    #[arg(long)]
    user_id: Uuid,

    /// Input payload as inline JSON
    #[arg(long, default_value = "{}")]
    input: String,

    /// Initial variables as an inline JSON object
    #[arg(long, default_value = "{}")]
    variables: String,

    /// Abort the run after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load()?;
    metrics::register_metrics();

    // Initialize store
    let store = create_store(&config.database).await?;
    store.init().await?;

    // Wire collaborators; entity data access is registered by the host
    // application, so a standalone run starts with an empty registry.
    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(&config.smtp)?);
    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(config.notifications.endpoint.clone()));
    let entities = EntityRegistry::new();

    let executor = StepExecutor::new(mailer, notifier, entities, config.smtp.from.clone());
    let engine = WorkflowEngine::new(store, executor);

    let input: Value = serde_json::from_str(&args.input)?;
    let variables = match serde_json::from_str::<Value>(&args.variables)? {
        Value::Object(map) => map,
        _ => anyhow::bail!("--variables must be a JSON object"),
    };

    let control = match args.timeout_secs.or(config.engine.run_timeout_secs) {
        Some(secs) => RunControl::with_deadline(Duration::from_secs(secs)),
        None => RunControl::new(),
    };

    let run = RunContext {
        tenant_id: args.tenant_id,
        user_id: args.user_id,
        input,
        variables,
    };

    let execution_id = engine.run(args.workflow_id, run, control).await?;
    info!(%execution_id, "workflow run finished");
    println!("{execution_id}");

    Ok(())
}
