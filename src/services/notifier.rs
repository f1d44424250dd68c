use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

/// Payload of the membership confirmation email.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipNotification {
    pub name: String,
    pub amount_paid: Decimal,
    pub expires_on: DateTime<Utc>,
    pub email: String,
}

/// Best-effort delivery; callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_membership_confirmation(&self, notification: &MembershipNotification) -> Result<()>;
}

#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    /// A stalled mail endpoint gives up after `timeout` instead of holding the workflow open.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_membership_confirmation(&self, notification: &MembershipNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(notification)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Membership email failed: {}", error_text));
        }

        log::info!("Sent membership confirmation to {}", notification.email);
        Ok(())
    }
}

/// Used when no mail endpoint is configured.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_membership_confirmation(&self, notification: &MembershipNotification) -> Result<()> {
        log::info!(
            "Membership confirmation for {} <{}>: paid {}, expires {}",
            notification.name,
            notification.email,
            notification.amount_paid,
            notification.expires_on
        );
        Ok(())
    }
}
