use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

/// Delivery channel for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
}

fn default_channels() -> Vec<Channel> {
    vec![Channel::InApp, Channel::Email]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// A recipient as written in a workflow definition: either a bare user id or
/// a detailed form with explicit tenant and channels.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecipientSpec {
    Id(Uuid),
    #[serde(rename_all = "camelCase")]
    Detailed {
        user_id: Uuid,
        #[serde(default)]
        tenant_id: Option<Uuid>,
        #[serde(default)]
        channels: Option<Vec<Channel>>,
    },
}

impl RecipientSpec {
    /// Fill in the run's tenant and the default channel set where the
    /// definition left them out.
    pub fn normalize(&self, default_tenant: Uuid) -> Recipient {
        match self {
            RecipientSpec::Id(user_id) => Recipient {
                user_id: *user_id,
                tenant_id: default_tenant,
                channels: default_channels(),
            },
            RecipientSpec::Detailed {
                user_id,
                tenant_id,
                channels,
            } => Recipient {
                user_id: *user_id,
                tenant_id: tenant_id.unwrap_or(default_tenant),
                channels: channels.clone().unwrap_or_else(default_channels),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub category: String,
    pub priority: NotificationPriority,
    pub metadata: Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipients: &[Recipient], payload: &NotificationPayload) -> Result<()>;
}

/// Client for the platform notification service.
pub struct HttpNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, recipients: &[Recipient], payload: &NotificationPayload) -> Result<()> {
        let body = serde_json::json!({
            "recipients": recipients,
            "notification": payload,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("notification request failed: {e}")))?;

        if response.status().is_success() {
            debug!(count = recipients.len(), "notification delivered");
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(Error::Notify(format!(
                "notification service returned {status}: {text}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_id_gets_defaults() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let spec: RecipientSpec = serde_json::from_value(json!(user.to_string())).unwrap();

        let recipient = spec.normalize(tenant);
        assert_eq!(recipient.user_id, user);
        assert_eq!(recipient.tenant_id, tenant);
        assert_eq!(recipient.channels, vec![Channel::InApp, Channel::Email]);
    }

    #[test]
    fn detailed_recipient_keeps_explicit_fields() {
        let tenant = Uuid::new_v4();
        let other_tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let spec: RecipientSpec = serde_json::from_value(json!({
            "userId": user.to_string(),
            "tenantId": other_tenant.to_string(),
            "channels": ["email"],
        }))
        .unwrap();

        let recipient = spec.normalize(tenant);
        assert_eq!(recipient.tenant_id, other_tenant);
        assert_eq!(recipient.channels, vec![Channel::Email]);
    }

    #[test]
    fn detailed_recipient_defaults_missing_fields() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let spec: RecipientSpec =
            serde_json::from_value(json!({"userId": user.to_string()})).unwrap();

        let recipient = spec.normalize(tenant);
        assert_eq!(recipient.tenant_id, tenant);
        assert_eq!(recipient.channels, vec![Channel::InApp, Channel::Email]);
    }
}
