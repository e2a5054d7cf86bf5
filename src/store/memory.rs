//! In-memory [`LinkStore`] used by tests and by local runs that have no
//! database configured.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use super::{LinkStore, TrackedLink, WatermarkKind};

#[derive(Default)]
struct Inner {
    next_id: i64,
    // link id -> canonical url
    links: BTreeMap<i64, Url>,
    by_url: HashMap<String, i64>,
    // link id -> subscribed chats
    subscriptions: HashMap<i64, BTreeSet<i64>>,
    // (chat id, link id) -> chat-scoped tags and filters
    scoped: HashMap<(i64, i64), (Vec<String>, Vec<String>)>,
    watermarks: HashMap<(i64, WatermarkKind), DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a chat to a URL, creating the link on first track.
    /// Tracking the same URL twice from one chat replaces that chat's
    /// tags and filters rather than duplicating the subscription.
    pub fn track(&self, chat_id: i64, url: &Url, tags: Vec<String>, filters: Vec<String>) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let key = url.to_string();
        let id = match inner.by_url.get(&key) {
            Some(id) => *id,
            None => {
                inner.next_id += 1;
                let id = inner.next_id;
                inner.links.insert(id, url.clone());
                inner.by_url.insert(key, id);
                id
            }
        };
        inner.subscriptions.entry(id).or_default().insert(chat_id);
        inner.scoped.insert((chat_id, id), (tags, filters));
        id
    }

    /// Remove a chat's subscription; the link itself is deleted when
    /// its last subscriber goes away.
    pub fn untrack(&self, chat_id: i64, link_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        let now_empty = match inner.subscriptions.get_mut(&link_id) {
            Some(subs) => {
                subs.remove(&chat_id);
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.subscriptions.remove(&link_id);
            if let Some(url) = inner.links.remove(&link_id) {
                inner.by_url.remove(&url.to_string());
            }
            inner.watermarks.retain(|(id, _), _| *id != link_id);
        }
        inner.scoped.remove(&(chat_id, link_id));
    }

    fn assemble(inner: &Inner, id: i64, url: &Url) -> TrackedLink {
        // The pipeline applies filters per link, so expose the union of
        // every subscriber's tags and filters.
        let mut tags = Vec::new();
        let mut filters = Vec::new();
        if let Some(subs) = inner.subscriptions.get(&id) {
            for chat_id in subs {
                if let Some((t, f)) = inner.scoped.get(&(*chat_id, id)) {
                    for tag in t {
                        if !tags.contains(tag) {
                            tags.push(tag.clone());
                        }
                    }
                    for filter in f {
                        if !filters.contains(filter) {
                            filters.push(filter.clone());
                        }
                    }
                }
            }
        }
        TrackedLink {
            id,
            url: url.clone(),
            tags,
            filters,
        }
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn page_of_links(&self, page: usize, page_size: usize) -> Result<Vec<TrackedLink>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .links
            .iter()
            .skip(page * page_size)
            .take(page_size)
            .map(|(id, url)| Self::assemble(&inner, *id, url))
            .collect())
    }

    async fn chat_ids_for_link(&self, link_id: i64) -> Result<Vec<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .subscriptions
            .get(&link_id)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn watermark(
        &self,
        link_id: i64,
        kind: WatermarkKind,
    ) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.watermarks.get(&(link_id, kind)).copied())
    }

    async fn advance_watermark(
        &self,
        link_id: i64,
        kind: WatermarkKind,
        to: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.watermarks.entry((link_id, kind)).or_insert(to);
        if to > *entry {
            *entry = to;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn same_url_shares_one_link() {
        let store = MemoryStore::new();
        let a = store.track(1, &url("https://github.com/o/r"), vec![], vec![]);
        let b = store.track(2, &url("https://github.com/o/r"), vec![], vec![]);
        assert_eq!(a, b);
        assert_eq!(store.chat_ids_for_link(a).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn untracking_last_subscriber_deletes_link() {
        let store = MemoryStore::new();
        let id = store.track(1, &url("https://github.com/o/r"), vec![], vec![]);
        store.track(2, &url("https://github.com/o/r"), vec![], vec![]);

        store.untrack(1, id);
        assert_eq!(store.page_of_links(0, 10).await.unwrap().len(), 1);

        store.untrack(2, id);
        assert!(store.page_of_links(0, 10).await.unwrap().is_empty());
        assert_eq!(store.watermark(id, WatermarkKind::Updated).await.unwrap(), None);
    }

    #[tokio::test]
    async fn filters_are_unioned_across_subscribers() {
        let store = MemoryStore::new();
        let u = url("https://github.com/o/r");
        store.track(1, &u, vec![], vec!["user:bob".into()]);
        store.track(2, &u, vec![], vec!["user:alice".into()]);

        let page = store.page_of_links(0, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        let mut filters = page[0].filters.clone();
        filters.sort();
        assert_eq!(filters, vec!["user:alice", "user:bob"]);
    }

    #[tokio::test]
    async fn watermark_never_regresses() {
        let store = MemoryStore::new();
        let id = store.track(1, &url("https://github.com/o/r"), vec![], vec![]);

        store
            .advance_watermark(id, WatermarkKind::Updated, ts(100))
            .await
            .unwrap();
        store
            .advance_watermark(id, WatermarkKind::Updated, ts(50))
            .await
            .unwrap();
        assert_eq!(
            store.watermark(id, WatermarkKind::Updated).await.unwrap(),
            Some(ts(100))
        );

        store
            .advance_watermark(id, WatermarkKind::Updated, ts(200))
            .await
            .unwrap();
        assert_eq!(
            store.watermark(id, WatermarkKind::Updated).await.unwrap(),
            Some(ts(200))
        );
    }

    #[tokio::test]
    async fn watermark_kinds_are_independent() {
        let store = MemoryStore::new();
        let id = store.track(1, &url("https://stackoverflow.com/questions/1"), vec![], vec![]);

        store
            .advance_watermark(id, WatermarkKind::Activity, ts(300))
            .await
            .unwrap();
        assert_eq!(store.watermark(id, WatermarkKind::Updated).await.unwrap(), None);
        assert_eq!(
            store.watermark(id, WatermarkKind::Activity).await.unwrap(),
            Some(ts(300))
        );
    }

    #[tokio::test]
    async fn pagination_walks_links_in_id_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.track(
                1,
                &url(&format!("https://github.com/o/r{i}")),
                vec![],
                vec![],
            );
        }

        let first = store.page_of_links(0, 2).await.unwrap();
        let second = store.page_of_links(1, 2).await.unwrap();
        let third = store.page_of_links(2, 2).await.unwrap();
        let fourth = store.page_of_links(3, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert!(fourth.is_empty());
        assert!(first[0].id < first[1].id);
        assert!(first[1].id < second[0].id);
    }
}
