//! Direct-call transport: synchronous POST to the bot's ingestion
//! endpoint.

use anyhow::Context as _;
use async_trait::async_trait;

use super::{LinkUpdate, NotificationSender};

pub struct DirectSender {
    client: reqwest::Client,
    bot_url: String,
}

impl DirectSender {
    pub fn new(bot_url: String) -> Self {
        DirectSender {
            client: reqwest::Client::new(),
            bot_url,
        }
    }
}

#[async_trait]
impl NotificationSender for DirectSender {
    async fn send(&self, update: &LinkUpdate) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/links", self.bot_url))
            .json(update)
            .send()
            .await
            .context("posting update to the bot")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("bot rejected update with {status}: {body}");
        }
        tracing::info!(url = %update.url, "notification sent via http");
        Ok(())
    }
}
