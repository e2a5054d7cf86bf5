//! Per-source update handlers.
//!
//! Each handler owns one resource type: it claims URLs via
//! [`UpdateHandler::supports`], fetches items newer than the link's
//! watermark, renders notification messages and advances the watermark.
//! The watermark moves after successful formatting regardless of
//! delivery outcome, so a flaky transport cannot cause re-notification
//! storms; a fetch failure leaves it untouched so the next cycle
//! retries from the same cutoff.

use async_trait::async_trait;
use url::Url;

use crate::store::TrackedLink;

pub mod github;
pub mod stackoverflow;

pub use github::GithubUpdateHandler;
pub use stackoverflow::StackOverflowUpdateHandler;

/// Rendered body excerpts are bounded to this many characters.
pub const BODY_LIMIT: usize = 200;

#[async_trait]
pub trait UpdateHandler: Send + Sync {
    /// Whether this handler understands URLs of the given host.
    fn supports(&self, url: &Url) -> bool;

    /// Run one `fetch -> filter -> format -> notify -> advance`
    /// pass for a single link. An error aborts this link only.
    async fn handle(&self, link: &TrackedLink) -> anyhow::Result<()>;
}

/// Body excerpt for a notification: truncated with an ellipsis marker,
/// `No description` when absent.
pub(crate) fn render_body(body: Option<&str>) -> String {
    match body {
        None => "No description".to_string(),
        Some(text) => {
            if text.chars().count() > BODY_LIMIT {
                let mut out: String = text.chars().take(BODY_LIMIT).collect();
                out.push_str("...");
                out
            } else {
                text.to_string()
            }
        }
    }
}

/// Case-insensitive `user:<name>` author exclusion.
pub(crate) fn author_excluded(excluded: &[String], author: &str) -> bool {
    let author = author.to_lowercase();
    excluded.iter().any(|name| *name == author)
}
