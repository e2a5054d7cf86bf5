//! Notification dispatch towards the messaging front end.
//!
//! Two concrete transports exist: a message-bus publish
//! ([`bus::BusSender`]) and a direct call to the bot's ingestion
//! endpoint ([`direct::DirectSender`]). Production wraps both in a
//! [`FailoverSender`] so a delivery failure can never destabilize the
//! scheduler loop.

use std::sync::Arc;

use async_trait::async_trait;

pub mod bus;
pub mod direct;

pub use bus::BusSender;
pub use direct::DirectSender;

/// Wire payload consumed by the bot.
///
/// Field names match the front end's JSON contract.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LinkUpdate {
    pub id: Option<i64>,
    pub url: String,
    pub description: String,
    #[serde(rename = "tgChatIds")]
    pub tg_chat_ids: Vec<i64>,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, update: &LinkUpdate) -> anyhow::Result<()>;
}

/// Tries the primary transport, falls back to the secondary on any
/// error, and drops the update (with a log entry) if both fail. Never
/// surfaces an error to the caller.
pub struct FailoverSender {
    primary: Arc<dyn NotificationSender>,
    secondary: Arc<dyn NotificationSender>,
}

impl FailoverSender {
    pub fn new(primary: Arc<dyn NotificationSender>, secondary: Arc<dyn NotificationSender>) -> Self {
        FailoverSender { primary, secondary }
    }
}

#[async_trait]
impl NotificationSender for FailoverSender {
    async fn send(&self, update: &LinkUpdate) -> anyhow::Result<()> {
        if let Err(e) = self.primary.send(update).await {
            tracing::error!(
                url = %update.url,
                "primary notification transport failed, switching to fallback: {e:?}"
            );
            if let Err(e) = self.secondary.send(update).await {
                tracing::error!(
                    url = %update.url,
                    "fallback notification transport also failed, dropping update: {e:?}"
                );
            }
        }
        Ok(())
    }
}
