//! Message-bus transport.
//!
//! Publishes the serialized update to the `link-updates` topic through
//! a Kafka REST proxy; the queue itself is an external collaborator.
//! A payload that cannot be serialized is redirected to the dead-letter
//! topic together with the failure reason instead of being dropped
//! silently.

use anyhow::Context as _;
use async_trait::async_trait;

use super::{LinkUpdate, NotificationSender};

pub const UPDATES_TOPIC: &str = "link-updates";
pub const DEAD_LETTER_TOPIC: &str = "link-updates-dlq";

pub struct BusSender {
    client: reqwest::Client,
    proxy_url: String,
    topic: String,
    dead_letter_topic: String,
}

impl BusSender {
    pub fn new(proxy_url: String) -> Self {
        BusSender {
            client: reqwest::Client::new(),
            proxy_url,
            topic: UPDATES_TOPIC.to_string(),
            dead_letter_topic: DEAD_LETTER_TOPIC.to_string(),
        }
    }

    async fn publish(&self, topic: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/topics/{topic}", self.proxy_url))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/vnd.kafka.json.v2+json",
            )
            .json(&serde_json::json!({ "records": [{ "value": value }] }))
            .send()
            .await
            .with_context(|| format!("publishing to topic {topic}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("bus proxy rejected publish to {topic} with {status}: {body}");
        }
        Ok(())
    }

    /// Best-effort dead-letter publish: the raw payload plus the reason
    /// it could not be processed. No structured schema is enforced.
    pub async fn dead_letter(&self, raw: &str, reason: &str) {
        let value = serde_json::json!({
            "payload": raw,
            "reason": reason,
        });
        if let Err(e) = self.publish(&self.dead_letter_topic, value).await {
            tracing::error!("failed to publish to dead-letter topic: {e:?}");
        }
    }
}

#[async_trait]
impl NotificationSender for BusSender {
    async fn send(&self, update: &LinkUpdate) -> anyhow::Result<()> {
        let value = match serde_json::to_value(update) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("failed to serialize update, sending to dead letter: {e}");
                self.dead_letter(&format!("{update:?}"), &e.to_string()).await;
                return Ok(());
            }
        };
        self.publish(&self.topic, value).await?;
        tracing::info!(url = %update.url, "notification sent via bus");
        Ok(())
    }
}
