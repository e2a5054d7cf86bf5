//! Update handler for GitHub repository links.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use crate::github::{GithubApi, GithubItem, GithubRepo};
use crate::notify::{LinkUpdate, NotificationSender};
use crate::store::{LinkStore, TrackedLink, WatermarkKind};

use super::{author_excluded, render_body, UpdateHandler};

pub struct GithubUpdateHandler {
    api: Arc<dyn GithubApi>,
    store: Arc<dyn LinkStore>,
    sender: Arc<dyn NotificationSender>,
}

impl GithubUpdateHandler {
    pub fn new(
        api: Arc<dyn GithubApi>,
        store: Arc<dyn LinkStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        GithubUpdateHandler { api, store, sender }
    }

    fn format_item(link: &TrackedLink, item: &GithubItem) -> String {
        let kind = if item.is_pull_request() {
            "\u{1F504} New PR"
        } else {
            "\u{1F4DD} New Issue"
        };
        format!(
            "\u{1F4E2} Update for: {}\n\u{1F517} Link: {}\n{kind}: {}\n\u{1F464} Author: {}\n\u{23F0} Created: {}\n\u{1F4C4} Description: {}",
            link.url,
            item.url,
            item.title,
            item.user.login,
            item.created_at,
            render_body(item.body.as_deref()),
        )
    }
}

#[async_trait]
impl UpdateHandler for GithubUpdateHandler {
    fn supports(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case("github.com"))
    }

    async fn handle(&self, link: &TrackedLink) -> anyhow::Result<()> {
        let repo = GithubRepo::from_url(&link.url)
            .ok_or_else(|| anyhow::anyhow!("not a repository url: {}", link.url))?;

        // A freshly tracked link starts from "now" so pre-existing
        // history is not retroactively notified.
        let since = match self.store.watermark(link.id, WatermarkKind::Updated).await? {
            Some(t) => t,
            None => Utc::now(),
        };

        let items = self
            .api
            .fetch_items("issues", &repo.owner, &repo.repo, since)
            .await?;
        if items.is_empty() {
            return Ok(());
        }

        // The watermark covers every fetched item, filtered or not;
        // otherwise an excluded author's item would be re-fetched
        // forever.
        let newest = items
            .iter()
            .map(|item| item.created_at)
            .max()
            .unwrap_or(since);

        let excluded = link.excluded_authors();
        let chat_ids = self.store.chat_ids_for_link(link.id).await?;
        if chat_ids.is_empty() {
            tracing::debug!(link = %link.url, "no subscribers, skipping notification");
        } else {
            for item in items
                .iter()
                .filter(|item| !author_excluded(&excluded, &item.user.login))
            {
                let update = LinkUpdate {
                    id: Some(link.id),
                    url: link.url.to_string(),
                    description: Self::format_item(link, item),
                    tg_chat_ids: chat_ids.clone(),
                };
                if let Err(e) = self.sender.send(&update).await {
                    tracing::error!(link = %link.url, "notification delivery failed: {e:?}");
                }
            }
        }

        self.store
            .advance_watermark(link.id, WatermarkKind::Updated, newest)
            .await?;
        Ok(())
    }
}
