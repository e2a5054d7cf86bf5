//! Dispatches each tracked link to the first handler that supports its
//! URL. Links no handler claims are skipped silently; adding a source
//! type means registering another handler, nothing here changes.

use std::sync::Arc;

use futures::StreamExt;

use crate::handlers::UpdateHandler;
use crate::store::TrackedLink;

pub struct LinkProcessor {
    handlers: Vec<Arc<dyn UpdateHandler>>,
    /// Bound on concurrently processed links within one batch. External
    /// calls dominate latency, so a batch is worked through a bounded
    /// pool rather than strictly sequentially.
    max_in_flight: usize,
}

impl LinkProcessor {
    pub fn new(handlers: Vec<Arc<dyn UpdateHandler>>, max_in_flight: usize) -> Self {
        LinkProcessor {
            handlers,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Process a batch. A failure on one link never aborts the others;
    /// it is logged and the batch continues.
    pub async fn process(&self, links: Vec<TrackedLink>) {
        futures::stream::iter(links)
            .for_each_concurrent(self.max_in_flight, |link| async move {
                let Some(handler) = self.handlers.iter().find(|h| h.supports(&link.url)) else {
                    tracing::trace!(link = %link.url, "no handler for host, skipping");
                    return;
                };
                if let Err(e) = handler.handle(&link).await {
                    tracing::error!(link = %link.url, "update check failed: {e:?}");
                }
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use url::Url;

    struct HostHandler {
        host: &'static str,
        fail_for: Option<&'static str>,
        handled: Mutex<Vec<String>>,
    }

    impl HostHandler {
        fn new(host: &'static str) -> Self {
            HostHandler {
                host,
                fail_for: None,
                handled: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UpdateHandler for HostHandler {
        fn supports(&self, url: &Url) -> bool {
            url.host_str() == Some(self.host)
        }

        async fn handle(&self, link: &TrackedLink) -> anyhow::Result<()> {
            if let Some(substr) = self.fail_for {
                if link.url.as_str().contains(substr) {
                    anyhow::bail!("simulated fetch failure");
                }
            }
            self.handled.lock().unwrap().push(link.url.to_string());
            Ok(())
        }
    }

    fn link(id: i64, url: &str) -> TrackedLink {
        TrackedLink {
            id,
            url: Url::parse(url).unwrap(),
            tags: vec![],
            filters: vec![],
        }
    }

    #[tokio::test]
    async fn links_go_to_the_first_supporting_handler() {
        let github = Arc::new(HostHandler::new("github.com"));
        let so = Arc::new(HostHandler::new("stackoverflow.com"));
        let processor = LinkProcessor::new(vec![github.clone(), so.clone()], 4);

        processor
            .process(vec![
                link(1, "https://github.com/o/r"),
                link(2, "https://stackoverflow.com/questions/42"),
                link(3, "https://example.com/whatever"),
            ])
            .await;

        assert_eq!(
            github.handled.lock().unwrap().as_slice(),
            ["https://github.com/o/r"]
        );
        assert_eq!(
            so.handled.lock().unwrap().as_slice(),
            ["https://stackoverflow.com/questions/42"]
        );
    }

    #[tokio::test]
    async fn one_failing_link_does_not_stop_the_batch() {
        let handler = Arc::new(HostHandler {
            host: "github.com",
            fail_for: Some("/bad/"),
            handled: Mutex::new(Vec::new()),
        });
        let processor = LinkProcessor::new(vec![handler.clone()], 1);

        processor
            .process(vec![
                link(1, "https://github.com/bad/repo"),
                link(2, "https://github.com/good/repo"),
            ])
            .await;

        assert_eq!(
            handler.handled.lock().unwrap().as_slice(),
            ["https://github.com/good/repo"]
        );
    }

    #[tokio::test]
    async fn unmatched_links_are_skipped_silently() {
        let processor = LinkProcessor::new(vec![], 2);
        // Must simply complete.
        processor.process(vec![link(1, "https://example.com/x")]).await;
    }
}
