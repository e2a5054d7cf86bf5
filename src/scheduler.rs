//! Fixed-interval scan over all tracked links.
//!
//! Each tick spawns a cycle that pages through the store until an
//! empty page comes back. Ticks fire on the wall clock regardless of
//! how long a cycle takes, so cycles may overlap; that is safe because
//! watermark advancement is monotonic and idempotent per link, and the
//! worst case is a duplicate notification, never a lost one.

use std::sync::Arc;
use std::time::Duration;

use crate::processor::LinkProcessor;
use crate::store::LinkStore;

pub struct Scheduler {
    store: Arc<dyn LinkStore>,
    processor: Arc<LinkProcessor>,
    interval: Duration,
    page_size: usize,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn LinkStore>,
        processor: LinkProcessor,
        interval: Duration,
        page_size: usize,
    ) -> Self {
        Scheduler {
            store,
            processor: Arc::new(processor),
            interval,
            page_size,
        }
    }

    /// Spawn the timer loop. Runs until the returned handle is aborted
    /// or the runtime shuts down.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    this.run_cycle().await;
                });
            }
        })
    }

    /// One full scan: unbounded pagination until an empty page. A store
    /// error ends the cycle early; the next tick starts fresh.
    pub async fn run_cycle(&self) {
        tracing::info!("checking for updates");
        let mut page = 0;
        loop {
            let links = match self.store.page_of_links(page, self.page_size).await {
                Ok(links) => links,
                Err(e) => {
                    tracing::error!("failed to fetch links page {page}: {e:?}");
                    return;
                }
            };
            if links.is_empty() {
                return;
            }
            self.processor.process(links).await;
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::UpdateHandler;
    use crate::store::{MemoryStore, TrackedLink};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use url::Url;

    struct CountingHandler {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateHandler for CountingHandler {
        fn supports(&self, _url: &Url) -> bool {
            true
        }

        async fn handle(&self, link: &TrackedLink) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(link.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_cycle_visits_every_link_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..5 {
            store.track(
                1,
                &Url::parse(&format!("https://github.com/o/r{i}")).unwrap(),
                vec![],
                vec![],
            );
        }
        let handler = Arc::new(CountingHandler {
            seen: Mutex::new(Vec::new()),
        });
        let processor = LinkProcessor::new(vec![handler.clone()], 2);
        let scheduler = Scheduler::new(
            store,
            processor,
            Duration::from_secs(10),
            // page size smaller than the link count forces pagination
            2,
        );

        scheduler.run_cycle().await;

        let mut seen = handler.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen.len(), 5);
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn empty_store_means_an_idle_cycle() {
        let handler = Arc::new(CountingHandler {
            seen: Mutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(
            Arc::new(MemoryStore::new()),
            LinkProcessor::new(vec![handler.clone()], 2),
            Duration::from_secs(10),
            100,
        );
        scheduler.run_cycle().await;
        assert!(handler.seen.lock().unwrap().is_empty());
    }
}
