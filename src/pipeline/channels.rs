//! Channel delivery (spec §4.F, §6 payload shapes).
//!
//! Webhook and Slack are thin HTTP POSTs with a bounded timeout; email goes out over
//! SMTP via `lettre`. A channel failure is captured as a `ChannelResult { success:
//! false }` and never propagates as an error: the dispatcher decides overall alert
//! status from the aggregate of these results.

use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::json;

use crate::config::DispatcherConfig;
use crate::models::{Alert, Channel, ChannelResult, Priority};

pub struct ChannelSender {
    client: Client,
    config: DispatcherConfig,
}

impl ChannelSender {
    pub fn new(config: DispatcherConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.channel_timeout_seconds))
            .build()
            .expect("failed to build HTTP client");
        Self { client, config }
    }

    pub async fn send(&self, alert: &Alert, channel: Channel) -> ChannelResult {
        let result = match channel {
            Channel::Webhook => self.send_webhook(alert).await,
            Channel::Slack => self.send_slack(alert).await,
            Channel::Email => self.send_email(alert).await,
        };

        match result {
            Ok(status_code) => ChannelResult {
                channel,
                success: (200..300).contains(&status_code),
                status_code: Some(status_code),
                error: None,
            },
            Err(message) => ChannelResult {
                channel,
                success: false,
                status_code: None,
                error: Some(message),
            },
        }
    }

    async fn send_webhook(&self, alert: &Alert) -> Result<u16, String> {
        let url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or_else(|| "webhook channel enabled but no URL configured".to_string())?;

        let payload = webhook_payload(alert);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.post(url).json(&payload).send().await {
                Ok(response) => return Ok(response.status().as_u16()),
                Err(err) if attempt < self.config.webhook_retry_attempts => {
                    tracing::warn!(attempt, error = %err, "webhook delivery attempt failed, retrying");
                    continue;
                }
                Err(err) => return Err(err.to_string()),
            }
        }
    }

    async fn send_slack(&self, alert: &Alert) -> Result<u16, String> {
        let url = self
            .config
            .slack_webhook_url
            .as_deref()
            .ok_or_else(|| "slack channel enabled but no webhook URL configured".to_string())?;

        let payload = slack_payload(alert, self.config.slack_channel.as_deref());

        self.client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map(|r| r.status().as_u16())
            .map_err(|e| e.to_string())
    }

    async fn send_email(&self, alert: &Alert) -> Result<u16, String> {
        let host = self
            .config
            .smtp_host
            .as_deref()
            .ok_or_else(|| "email channel enabled but no SMTP host configured".to_string())?;
        let from = self
            .config
            .email_from
            .as_deref()
            .ok_or_else(|| "email channel enabled but no from address configured".to_string())?;
        let to = self
            .config
            .email_to
            .as_deref()
            .ok_or_else(|| "email channel enabled but no to address configured".to_string())?;

        let message = Message::builder()
            .from(from.parse().map_err(|e| format!("invalid email_from: {e}"))?)
            .to(to.parse().map_err(|e| format!("invalid email_to: {e}"))?)
            .subject(format!("[{}] {}", alert.category, alert.title))
            .body(email_body(alert))
            .map_err(|e| e.to_string())?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(self.config.smtp_port)
            .timeout(Some(Duration::from_secs(self.config.channel_timeout_seconds)));
        if let (Some(username), Some(password)) = (&self.config.smtp_username, &self.config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let transport = builder.build();

        transport
            .send(message)
            .await
            .map(|_| 250u16)
            .map_err(|e| e.to_string())
    }
}

const SYSTEM_NAME: &str = "feedwatch";
const SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");

fn webhook_payload(alert: &Alert) -> serde_json::Value {
    json!({
        "type": "news_alert",
        "alert": {
            "id": alert.id,
            "title": alert.title,
            "summary": alert.summary,
            "source": alert.source,
            "category": alert.category,
            "priority": alert.priority,
            "url": alert.url,
            "publishedAt": alert.published_at,
            "entities": alert.entities.iter().take(10).collect::<Vec<_>>(),
            "tags": alert.tags,
            "createdAt": alert.created_at,
        },
        "metadata": {
            "system": SYSTEM_NAME,
            "version": SYSTEM_VERSION,
            "timestamp": alert.created_at,
        },
    })
}

fn email_body(alert: &Alert) -> String {
    format!(
        "{}\n\n{}\n\nSource: {} | Category: {} | Priority: {:?}\nPublished: {}\n{}",
        alert.title,
        alert.summary.clone().unwrap_or_default(),
        alert.source,
        alert.category,
        alert.priority,
        alert.published_at.to_rfc3339(),
        alert.url,
    )
}

fn slack_payload(alert: &Alert, channel: Option<&str>) -> serde_json::Value {
    let color = match alert.priority {
        Priority::High => "danger",
        Priority::Medium => "warning",
        Priority::Low => "good",
    };

    json!({
        "channel": channel,
        "attachments": [{
            "color": color,
            "title": alert.title,
            "title_link": alert.url,
            "text": alert.summary.clone().unwrap_or_default(),
            "fields": [
                { "title": "Source", "value": alert.source, "short": true },
                { "title": "Category", "value": alert.category, "short": true },
                { "title": "Priority", "value": format!("{:?}", alert.priority), "short": true },
                { "title": "Published", "value": alert.published_at.to_rfc3339(), "short": true },
            ],
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_alert(priority: Priority) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            article_id: Uuid::new_v4(),
            title: "Acme buys Beta".to_string(),
            summary: Some("A summary".to_string()),
            source: "wire-a".to_string(),
            category: "business".to_string(),
            priority,
            url: "https://example.com/a".to_string(),
            published_at: Utc::now(),
            entities: vec![],
            tags: vec![],
            channels: vec![Channel::Webhook],
            status: crate::models::AlertStatus::Pending,
            created_at: Utc::now(),
            sent_at: None,
            results: vec![],
            resend_count: 0,
        }
    }

    #[test]
    fn slack_color_varies_by_priority() {
        let high = slack_payload(&sample_alert(Priority::High), None);
        let low = slack_payload(&sample_alert(Priority::Low), None);
        assert_ne!(
            high["attachments"][0]["color"],
            low["attachments"][0]["color"]
        );
    }

    #[test]
    fn webhook_payload_carries_article_and_metadata_sections() {
        let payload = webhook_payload(&sample_alert(Priority::Medium));
        assert_eq!(payload["type"], "news_alert");
        assert!(payload["alert"]["title"].is_string());
        assert!(payload["metadata"]["system"].is_string());
    }

    fn email_config(smtp_host: Option<&str>) -> DispatcherConfig {
        DispatcherConfig {
            cooldown_minutes: 5,
            max_alerts_per_hour: 20,
            channel_timeout_seconds: 1,
            webhook_enabled: false,
            webhook_url: None,
            webhook_retry_attempts: 1,
            email_enabled: true,
            smtp_host: smtp_host.map(str::to_string),
            smtp_port: 2525,
            smtp_username: None,
            smtp_password: None,
            email_from: Some("alerts@feedwatch.example".to_string()),
            email_to: Some("oncall@feedwatch.example".to_string()),
            slack_enabled: false,
            slack_webhook_url: None,
            slack_channel: None,
        }
    }

    #[test]
    fn send_email_without_smtp_host_fails_before_any_network_attempt() {
        let sender = ChannelSender::new(email_config(None));
        let err = futures::executor::block_on(sender.send_email(&sample_alert(Priority::High)))
            .unwrap_err();
        assert!(err.contains("SMTP host"));
    }

    #[tokio::test]
    async fn send_email_with_unreachable_host_surfaces_a_transport_error() {
        // Nothing listens on 2525 locally, so this exercises a real SMTP
        // connection failure rather than a disguised success.
        let sender = ChannelSender::new(email_config(Some("127.0.0.1")));
        let result = sender.send(&sample_alert(Priority::High), Channel::Email).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
