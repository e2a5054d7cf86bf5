//! Update handler for Stack Overflow question links.
//!
//! Answers and comments are fetched in the same pass and share the
//! `activity` watermark, which advances to the newest creation time
//! seen across both kinds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::notify::{LinkUpdate, NotificationSender};
use crate::stackoverflow::{Answer, Comment, Owner, StackOverflowApi};
use crate::store::{LinkStore, TrackedLink, WatermarkKind};

use super::{author_excluded, render_body, UpdateHandler};

pub struct StackOverflowUpdateHandler {
    api: Arc<dyn StackOverflowApi>,
    store: Arc<dyn LinkStore>,
    sender: Arc<dyn NotificationSender>,
}

impl StackOverflowUpdateHandler {
    pub fn new(
        api: Arc<dyn StackOverflowApi>,
        store: Arc<dyn LinkStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        StackOverflowUpdateHandler { api, store, sender }
    }

    fn author(owner: &Owner) -> &str {
        owner.display_name.as_deref().unwrap_or("Unknown")
    }

    fn format_answer(link: &TrackedLink, answer: &Answer) -> String {
        format!(
            "\u{1F4E2} Update for: {}\n\u{1F517} Answer Link: https://stackoverflow.com/a/{}\n\u{1F4A1} New Answer\n\u{1F464} Author: {}\n\u{23F0} Created: {}\n\u{1F4C4} Content: {}",
            link.url,
            answer.answer_id,
            Self::author(&answer.owner),
            answer.creation_date,
            render_body(answer.body.as_deref()),
        )
    }

    fn format_comment(link: &TrackedLink, comment: &Comment) -> String {
        // Comment permalinks hang off the question URL, minus any
        // existing fragment.
        let base = link.url.as_str().split('#').next().unwrap_or_default();
        format!(
            "\u{1F4E2} Update for: {}\n\u{1F517} Comment Link: {base}#comment{id}_{id}\n\u{1F4AC} New Comment\n\u{1F464} Author: {}\n\u{23F0} Created: {}\n\u{1F4C4} Content: {}",
            link.url,
            Self::author(&comment.owner),
            comment.creation_date,
            render_body(comment.body.as_deref()),
            id = comment.comment_id,
        )
    }

    async fn notify(&self, link: &TrackedLink, chat_ids: &[i64], description: String) {
        let update = LinkUpdate {
            id: Some(link.id),
            url: link.url.to_string(),
            description,
            tg_chat_ids: chat_ids.to_vec(),
        };
        if let Err(e) = self.sender.send(&update).await {
            tracing::error!(link = %link.url, "notification delivery failed: {e:?}");
        }
    }
}

#[async_trait]
impl UpdateHandler for StackOverflowUpdateHandler {
    fn supports(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case("stackoverflow.com"))
    }

    async fn handle(&self, link: &TrackedLink) -> anyhow::Result<()> {
        let question = crate::stackoverflow::question_id(&link.url)
            .ok_or_else(|| anyhow::anyhow!("not a question url: {}", link.url))?;

        let since = match self
            .store
            .watermark(link.id, WatermarkKind::Activity)
            .await?
        {
            Some(t) => t,
            None => Utc::now(),
        };

        let (answers, comments) = futures::future::try_join(
            self.api.new_answers(question, since),
            self.api.new_comments(question, since),
        )
        .await?;
        if answers.is_empty() && comments.is_empty() {
            return Ok(());
        }

        let newest: DateTime<Utc> = answers
            .iter()
            .map(|a| a.creation_date)
            .chain(comments.iter().map(|c| c.creation_date))
            .max()
            .unwrap_or(since);

        let excluded = link.excluded_authors();
        let chat_ids = self.store.chat_ids_for_link(link.id).await?;
        if chat_ids.is_empty() {
            tracing::debug!(link = %link.url, "no subscribers, skipping notification");
        } else {
            for answer in answers
                .iter()
                .filter(|a| !author_excluded(&excluded, Self::author(&a.owner)))
            {
                self.notify(link, &chat_ids, Self::format_answer(link, answer))
                    .await;
            }
            for comment in comments
                .iter()
                .filter(|c| !author_excluded(&excluded, Self::author(&c.owner)))
            {
                self.notify(link, &chat_ids, Self::format_comment(link, comment))
                    .await;
            }
        }

        self.store
            .advance_watermark(link.id, WatermarkKind::Activity, newest)
            .await?;
        Ok(())
    }
}
