//! Access to tracked links, their subscriptions and watermarks.
//!
//! The update pipeline only ever talks to the [`LinkStore`] trait; the
//! backing implementation is either Postgres (production) or an
//! in-memory map (tests, local runs without a database).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A tracked resource URL together with the tags and filters attached
/// by its subscribers.
///
/// One `TrackedLink` exists per canonical URL regardless of how many
/// chats subscribe to it; an update is detected once and fanned out.
#[derive(Debug, Clone)]
pub struct TrackedLink {
    pub id: i64,
    pub url: Url,
    pub tags: Vec<String>,
    pub filters: Vec<String>,
}

impl TrackedLink {
    /// Author names excluded by `user:<name>` filters, lower-cased for
    /// case-insensitive comparison.
    pub fn excluded_authors(&self) -> Vec<String> {
        self.filters
            .iter()
            .filter_map(|f| f.strip_prefix("user:"))
            .map(|name| name.to_lowercase())
            .collect()
    }
}

/// Which of the two per-link cursors a query refers to.
///
/// GitHub items are compared against `updated`, Stack Overflow
/// activity against `activity`. The two advance independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatermarkKind {
    Updated,
    Activity,
}

impl WatermarkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatermarkKind::Updated => "updated",
            WatermarkKind::Activity => "activity",
        }
    }
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// A fixed-size page of tracked links, ordered by id. An empty page
    /// means pagination is done.
    async fn page_of_links(&self, page: usize, page_size: usize) -> Result<Vec<TrackedLink>>;

    /// Chat ids subscribed to the given link.
    async fn chat_ids_for_link(&self, link_id: i64) -> Result<Vec<i64>>;

    /// The stored cursor for the link, or `None` if the link was never
    /// processed.
    async fn watermark(&self, link_id: i64, kind: WatermarkKind)
    -> Result<Option<DateTime<Utc>>>;

    /// Move the cursor forward. Implementations must never regress the
    /// stored value, even when called with an older timestamp.
    async fn advance_watermark(
        &self,
        link_id: i64,
        kind: WatermarkKind,
        to: DateTime<Utc>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_with_filters(filters: &[&str]) -> TrackedLink {
        TrackedLink {
            id: 1,
            url: Url::parse("https://github.com/o/r").unwrap(),
            tags: vec![],
            filters: filters.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn excluded_authors_only_reads_user_filters() {
        let link = link_with_filters(&["user:Bob", "topic:rust", "user:alice"]);
        assert_eq!(link.excluded_authors(), vec!["bob", "alice"]);
    }

    #[test]
    fn excluded_authors_empty_without_filters() {
        assert!(link_with_filters(&[]).excluded_authors().is_empty());
    }
}
