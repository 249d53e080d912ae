use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::email::{EmailMessage, Mailer};
use crate::entities::EntityRegistry;
use crate::notify::{NotificationPayload, Notifier};
use crate::workflow::definition::{
    ActionConfig, CompareOp, ConditionConfig, CreateRecordParams, DelayConfig, SendEmailParams,
    SendNotificationParams, UpdateRecordParams, WebhookConfig,
};
use crate::workflow::engine::{RunContext, RunControl};
use crate::workflow::VariableContext;
use crate::{Error, Result};

/// Dispatch target for individual steps. Loop bodies recurse through the
/// interpreter, everything else lands here.
pub struct StepExecutor {
    mailer: Arc<dyn Mailer>,
    notifier: Arc<dyn Notifier>,
    entities: EntityRegistry,
    http: reqwest::Client,
    default_from: String,
}

impl StepExecutor {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        notifier: Arc<dyn Notifier>,
        entities: EntityRegistry,
        default_from: String,
    ) -> Self {
        Self {
            mailer,
            notifier,
            entities,
            http: reqwest::Client::new(),
            default_from,
        }
    }

    /// Evaluate the comparison and record the outcome under
    /// `<step_id>_result`. The interpreter itself never branches on it; only
    /// later steps that read the key observe the outcome.
    pub fn run_condition(
        &self,
        step_id: &str,
        config: &ConditionConfig,
        vars: &mut VariableContext,
    ) -> Result<()> {
        let resolved = vars.resolve_path(&config.path);
        let outcome = compare(resolved, config.operator, &config.value);
        debug!(path = %config.path, outcome, "condition evaluated");
        vars.set(format!("{step_id}_result"), Value::Bool(outcome));
        Ok(())
    }

    pub async fn run_action(&self, config: &ActionConfig, run: &RunContext) -> Result<()> {
        match config {
            ActionConfig::SendEmail(params) => self.send_email(params).await,
            ActionConfig::CreateRecord(params) => self.create_record(params, run).await,
            ActionConfig::UpdateRecord(params) => self.update_record(params, run).await,
            ActionConfig::SendNotification(params) => self.send_notification(params, run).await,
        }
    }

    async fn send_email(&self, params: &SendEmailParams) -> Result<()> {
        let message = EmailMessage {
            from: params.from.clone().unwrap_or_else(|| self.default_from.clone()),
            to: params.to.clone(),
            subject: params.subject.clone(),
            html: params.body.clone(),
        };
        info!(to = %message.to, "sending workflow email");
        self.mailer.send(&message).await
    }

    async fn create_record(&self, params: &CreateRecordParams, run: &RunContext) -> Result<()> {
        let records = self.entities.records(params.entity)?;

        let mut data = params.data.clone();
        data.insert("id".to_string(), json!(Uuid::new_v4()));
        data.insert("tenant_id".to_string(), json!(run.tenant_id));
        data.insert("created_at".to_string(), json!(Utc::now()));
        data.insert("created_by".to_string(), json!(run.user_id));

        info!(entity = %params.entity, "creating record");
        records.insert(run.tenant_id, Value::Object(data)).await
    }

    async fn update_record(&self, params: &UpdateRecordParams, run: &RunContext) -> Result<()> {
        let records = self.entities.records(params.entity)?;

        let mut data = params.data.clone();
        data.insert("updated_at".to_string(), json!(Utc::now()));
        data.insert("updated_by".to_string(), json!(run.user_id));

        info!(entity = %params.entity, id = %params.id, "updating record");
        records.update(run.tenant_id, params.id, Value::Object(data)).await
    }

    async fn send_notification(
        &self,
        params: &SendNotificationParams,
        run: &RunContext,
    ) -> Result<()> {
        let recipients: Vec<_> = params
            .recipients
            .iter()
            .map(|spec| spec.normalize(run.tenant_id))
            .collect();

        let payload = NotificationPayload {
            title: params.title.clone(),
            message: params.message.clone(),
            kind: params.kind,
            category: params.category.clone(),
            priority: params.priority,
            metadata: json!({ "source": "workflow" }),
        };

        info!(count = recipients.len(), "sending workflow notification");
        self.notifier.send(&recipients, &payload).await
    }

    /// Suspend the whole run. The only explicit suspension point in the
    /// engine; wakes early on cancellation or deadline.
    pub async fn run_delay(&self, config: &DelayConfig, control: &RunControl) -> Result<()> {
        debug!(duration_ms = config.duration, "delaying execution");
        control.sleep(Duration::from_millis(config.duration)).await
    }

    pub async fn run_webhook(
        &self,
        step_id: &str,
        config: &WebhookConfig,
        vars: &mut VariableContext,
    ) -> Result<()> {
        let mut request = self.http.request(config.method.clone(), config.url.as_str());

        // Default the content type but let caller-supplied headers win.
        if !config
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"))
        {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &config.body {
            request = request.body(serde_json::to_vec(body)?);
        }

        info!(url = %config.url, method = %config.method, "calling webhook");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::WebhookFailed {
                status: status.as_u16(),
                text: status.canonical_reason().unwrap_or("unknown status").to_string(),
            });
        }

        let payload: Value = response.json().await?;
        vars.set(format!("{step_id}_response"), payload);
        Ok(())
    }
}

fn compare(actual: Option<&Value>, operator: CompareOp, expected: &Value) -> bool {
    match operator {
        CompareOp::Equals => actual.map_or(false, |value| value == expected),
        CompareOp::NotEquals => actual.map_or(true, |value| value != expected),
        CompareOp::GreaterThan => match (actual.and_then(Value::as_f64), expected.as_f64()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        CompareOp::LessThan => match (actual.and_then(Value::as_f64), expected.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        CompareOp::Contains => match actual {
            Some(value) => text_of(value).contains(&text_of(expected)),
            None => false,
        },
    }
}

// Strings compare by their content, everything else by its JSON rendering.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_is_strict() {
        assert!(compare(Some(&json!(5)), CompareOp::Equals, &json!(5)));
        assert!(!compare(Some(&json!("5")), CompareOp::Equals, &json!(5)));
        assert!(!compare(None, CompareOp::Equals, &json!(5)));
        assert!(!compare(None, CompareOp::Equals, &Value::Null));
    }

    #[test]
    fn not_equals_treats_absent_as_different() {
        assert!(compare(None, CompareOp::NotEquals, &json!(1)));
        assert!(!compare(Some(&json!(1)), CompareOp::NotEquals, &json!(1)));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(compare(Some(&json!(10)), CompareOp::GreaterThan, &json!(9.5)));
        assert!(compare(Some(&json!(3)), CompareOp::LessThan, &json!(4)));
        assert!(!compare(Some(&json!("10")), CompareOp::GreaterThan, &json!(9)));
        assert!(!compare(None, CompareOp::LessThan, &json!(4)));
    }

    #[test]
    fn contains_coerces_both_sides_to_text() {
        assert!(compare(Some(&json!("warehouse-7")), CompareOp::Contains, &json!("house")));
        assert!(compare(Some(&json!(12345)), CompareOp::Contains, &json!(234)));
        assert!(!compare(Some(&json!("abc")), CompareOp::Contains, &json!("z")));
        assert!(!compare(None, CompareOp::Contains, &json!("a")));
    }
}
