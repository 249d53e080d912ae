use std::collections::HashMap;
use std::str::FromStr;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entities::EntityKind;
use crate::notify::{NotificationPriority, NotificationType, RecipientSpec};
use crate::store::WorkflowRecord;
use crate::{Error, Result};

/// One step as stored in a workflow definition row, before validation.
///
/// `next_step_id` and `condition_step_id` are carried by stored definitions
/// but never consulted: steps run strictly in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_step_id: Option<String>,
}

/// A workflow definition validated into typed step configs. Immutable for
/// the duration of a run.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    /// Validate a stored record into a runnable definition. Unknown step
    /// kinds, operators, actions and entity tables are rejected here, before
    /// any execution record exists.
    pub fn from_record(record: &WorkflowRecord) -> Result<Self> {
        let raw: Vec<RawStep> = serde_json::from_value(record.steps.clone())?;
        let steps = raw.into_iter().map(Step::validate).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: record.id,
            tenant_id: record.tenant_id,
            name: record.name.clone(),
            steps,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub config: StepConfig,
    /// Declared branching target; present in stored rows, never consulted.
    pub next_step_id: Option<String>,
    /// Declared condition target; present in stored rows, never consulted.
    pub condition_step_id: Option<String>,
}

impl Step {
    pub fn validate(raw: RawStep) -> Result<Self> {
        let config = match raw.kind.as_str() {
            "condition" => StepConfig::Condition(parse_condition(&raw.id, &raw.config)?),
            "action" => StepConfig::Action(parse_action(&raw.id, &raw.config)?),
            "loop" => StepConfig::Loop(parse_loop(&raw.id, &raw.config)?),
            "delay" => StepConfig::Delay(parse_delay(&raw.id, &raw.config)?),
            "webhook" => StepConfig::Webhook(parse_webhook(&raw.id, &raw.config)?),
            other => return Err(Error::UnknownStepKind(other.to_string())),
        };

        Ok(Self {
            id: raw.id,
            name: raw.name,
            config,
            next_step_id: raw.next_step_id,
            condition_step_id: raw.condition_step_id,
        })
    }
}

/// One variant per step kind, produced by load-time validation.
#[derive(Debug, Clone)]
pub enum StepConfig {
    Condition(ConditionConfig),
    Action(ActionConfig),
    Loop(LoopConfig),
    Delay(DelayConfig),
    Webhook(WebhookConfig),
}

#[derive(Debug, Clone)]
pub struct ConditionConfig {
    pub path: String,
    pub operator: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "equals" => Ok(CompareOp::Equals),
            "not_equals" => Ok(CompareOp::NotEquals),
            "greater_than" => Ok(CompareOp::GreaterThan),
            "less_than" => Ok(CompareOp::LessThan),
            "contains" => Ok(CompareOp::Contains),
            other => Err(Error::UnknownOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ActionConfig {
    SendEmail(SendEmailParams),
    CreateRecord(CreateRecordParams),
    UpdateRecord(UpdateRecordParams),
    SendNotification(SendNotificationParams),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendEmailParams {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateRecordParams {
    pub entity: EntityKind,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct UpdateRecordParams {
    pub entity: EntityKind,
    pub id: Uuid,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendNotificationParams {
    pub recipients: Vec<RecipientSpec>,
    pub title: String,
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: NotificationType,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub priority: NotificationPriority,
}

fn default_category() -> String {
    "workflow".to_string()
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub collection: String,
    pub max_iterations: u64,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// Suspension time in milliseconds.
    pub duration: u64,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

fn invalid(step_id: &str, detail: impl ToString) -> Error {
    Error::InvalidStep {
        step_id: step_id.to_string(),
        detail: detail.to_string(),
    }
}

fn parse_condition(step_id: &str, config: &Value) -> Result<ConditionConfig> {
    #[derive(Deserialize)]
    struct Raw {
        path: String,
        operator: String,
        #[serde(default)]
        value: Value,
    }

    let raw: Raw = serde_json::from_value(config.clone()).map_err(|e| invalid(step_id, e))?;
    let operator = raw.operator.parse::<CompareOp>()?;

    Ok(ConditionConfig {
        path: raw.path,
        operator,
        value: raw.value,
    })
}

fn parse_action(step_id: &str, config: &Value) -> Result<ActionConfig> {
    let action = config
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(step_id, "missing action name"))?;
    let parameters = config
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    match action {
        "send_email" => {
            let params: SendEmailParams =
                serde_json::from_value(parameters).map_err(|e| missing(action, e))?;
            Ok(ActionConfig::SendEmail(params))
        }
        "create_record" => {
            let entity = parse_entity(action, &parameters)?;
            let data = required_object(action, &parameters, "data")?;
            Ok(ActionConfig::CreateRecord(CreateRecordParams { entity, data }))
        }
        "update_record" => {
            let entity = parse_entity(action, &parameters)?;
            let id = parameters
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| missing(action, "missing field `id`"))?
                .parse::<Uuid>()?;
            let data = required_object(action, &parameters, "data")?;
            Ok(ActionConfig::UpdateRecord(UpdateRecordParams { entity, id, data }))
        }
        "send_notification" => {
            let params: SendNotificationParams =
                serde_json::from_value(parameters).map_err(|e| missing(action, e))?;
            Ok(ActionConfig::SendNotification(params))
        }
        other => Err(Error::UnsupportedAction(other.to_string())),
    }
}

fn missing(action: &str, detail: impl ToString) -> Error {
    Error::MissingParameters {
        action: action.to_string(),
        detail: detail.to_string(),
    }
}

fn parse_entity(action: &str, parameters: &Value) -> Result<EntityKind> {
    parameters
        .get("table")
        .and_then(Value::as_str)
        .ok_or_else(|| missing(action, "missing field `table`"))?
        .parse::<EntityKind>()
}

fn required_object(action: &str, parameters: &Value, field: &str) -> Result<Map<String, Value>> {
    match parameters.get(field) {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(missing(action, format!("field `{field}` must be an object"))),
        None => Err(missing(action, format!("missing field `{field}`"))),
    }
}

fn parse_loop(step_id: &str, config: &Value) -> Result<LoopConfig> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Raw {
        collection: String,
        #[serde(default = "default_max_iterations")]
        max_iterations: u64,
        #[serde(default)]
        steps: Vec<RawStep>,
    }

    let raw: Raw = serde_json::from_value(config.clone()).map_err(|e| invalid(step_id, e))?;
    let steps = raw.steps.into_iter().map(Step::validate).collect::<Result<Vec<_>>>()?;

    Ok(LoopConfig {
        collection: raw.collection,
        max_iterations: raw.max_iterations,
        steps,
    })
}

fn default_max_iterations() -> u64 {
    100
}

fn parse_delay(step_id: &str, config: &Value) -> Result<DelayConfig> {
    serde_json::from_value(config.clone()).map_err(|e| invalid(step_id, e))
}

fn parse_webhook(step_id: &str, config: &Value) -> Result<WebhookConfig> {
    #[derive(Deserialize)]
    struct Raw {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<Value>,
    }

    let raw: Raw = serde_json::from_value(config.clone()).map_err(|e| invalid(step_id, e))?;
    let method = Method::from_bytes(raw.method.to_uppercase().as_bytes())
        .map_err(|_| invalid(step_id, format!("invalid HTTP method: {}", raw.method)))?;

    Ok(WebhookConfig {
        url: raw.url,
        method,
        headers: raw.headers,
        body: raw.body,
    })
}

fn default_method() -> String {
    "POST".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(kind: &str, config: Value) -> RawStep {
        RawStep {
            id: "s1".to_string(),
            name: "step one".to_string(),
            kind: kind.to_string(),
            config,
            next_step_id: None,
            condition_step_id: None,
        }
    }

    #[test]
    fn validates_condition_step() {
        let step = Step::validate(raw(
            "condition",
            json!({"path": "order.total", "operator": "greater_than", "value": 100}),
        ))
        .unwrap();

        match step.config {
            StepConfig::Condition(cfg) => {
                assert_eq!(cfg.path, "order.total");
                assert_eq!(cfg.operator, CompareOp::GreaterThan);
                assert_eq!(cfg.value, json!(100));
            }
            other => panic!("expected condition config, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_step_kind() {
        let err = Step::validate(raw("approval", json!({}))).unwrap_err();
        assert!(matches!(err, Error::UnknownStepKind(kind) if kind == "approval"));
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = Step::validate(raw(
            "condition",
            json!({"path": "x", "operator": "matches", "value": 1}),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::UnknownOperator(op) if op == "matches"));
    }

    #[test]
    fn rejects_unknown_action() {
        let err = Step::validate(raw("action", json!({"action": "delete_record"}))).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction(a) if a == "delete_record"));
    }

    #[test]
    fn send_email_requires_all_parameters() {
        let err = Step::validate(raw(
            "action",
            json!({"action": "send_email", "parameters": {"to": "a@b.c", "subject": "hi"}}),
        ))
        .unwrap_err();
        match err {
            Error::MissingParameters { action, detail } => {
                assert_eq!(action, "send_email");
                assert!(detail.contains("body"));
            }
            other => panic!("expected missing parameters, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_entity_table() {
        let err = Step::validate(raw(
            "action",
            json!({"action": "create_record", "parameters": {"table": "invoices", "data": {}}}),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedEntity(t) if t == "invoices"));
    }

    #[test]
    fn loop_defaults_max_iterations() {
        let step = Step::validate(raw(
            "loop",
            json!({"collection": "items", "steps": []}),
        ))
        .unwrap();
        match step.config {
            StepConfig::Loop(cfg) => assert_eq!(cfg.max_iterations, 100),
            other => panic!("expected loop config, got {other:?}"),
        }
    }

    #[test]
    fn loop_validates_nested_steps() {
        let err = Step::validate(raw(
            "loop",
            json!({
                "collection": "items",
                "steps": [{"id": "inner", "kind": "condition", "config": {"path": "x", "operator": "matches"}}],
            }),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::UnknownOperator(_)));
    }

    #[test]
    fn webhook_defaults_to_post() {
        let step = Step::validate(raw("webhook", json!({"url": "https://example.com/hook"}))).unwrap();
        match step.config {
            StepConfig::Webhook(cfg) => {
                assert_eq!(cfg.method, Method::POST);
                assert!(cfg.headers.is_empty());
                assert!(cfg.body.is_none());
            }
            other => panic!("expected webhook config, got {other:?}"),
        }
    }

    #[test]
    fn branch_fields_are_kept_but_inert() {
        let mut raw_step = raw("delay", json!({"duration": 10}));
        raw_step.next_step_id = Some("s9".to_string());
        raw_step.condition_step_id = Some("s2".to_string());

        let step = Step::validate(raw_step).unwrap();
        assert_eq!(step.next_step_id.as_deref(), Some("s9"));
        assert_eq!(step.condition_step_id.as_deref(), Some("s2"));
    }

    #[test]
    fn raw_step_reads_camel_case_keys() {
        let raw: RawStep = serde_json::from_value(json!({
            "id": "s1",
            "kind": "delay",
            "config": {"duration": 5},
            "nextStepId": "s2",
            "conditionStepId": "s3",
        }))
        .unwrap();
        assert_eq!(raw.next_step_id.as_deref(), Some("s2"));
        assert_eq!(raw.condition_step_id.as_deref(), Some("s3"));
    }
}
