use std::sync::Arc;

use linktracker::config::{Config, Transport};
use linktracker::github::GithubClient;
use linktracker::handlers::{GithubUpdateHandler, StackOverflowUpdateHandler, UpdateHandler};
use linktracker::notify::{BusSender, DirectSender, FailoverSender, NotificationSender};
use linktracker::processor::LinkProcessor;
use linktracker::scheduler::Scheduler;
use linktracker::stackoverflow::StackOverflowClient;
use linktracker::store::{LinkStore, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    linktracker::logger::init();

    let config = Config::from_env()?;
    tracing::info!(
        "starting update checker: interval {:?}, page size {}",
        config.scan_interval,
        config.page_size
    );

    let store: Arc<dyn LinkStore> = Arc::new(PostgresStore::connect(&config.database_url).await?);

    let github = Arc::new(GithubClient::new(
        config.github_token.clone(),
        config.github_api_url.clone(),
    ));
    let stackoverflow = Arc::new(StackOverflowClient::new(
        config.stackoverflow_key.clone(),
        config.stackoverflow_access_token.clone(),
        config.stackoverflow_api_url.clone(),
    ));

    let bus: Arc<dyn NotificationSender> = Arc::new(BusSender::new(config.bus_proxy_url.clone()));
    let http: Arc<dyn NotificationSender> = Arc::new(DirectSender::new(config.bot_url.clone()));
    let sender: Arc<dyn NotificationSender> = match config.message_transport {
        Transport::Bus => Arc::new(FailoverSender::new(bus, http)),
        Transport::Http => Arc::new(FailoverSender::new(http, bus)),
    };

    let handlers: Vec<Arc<dyn UpdateHandler>> = vec![
        Arc::new(GithubUpdateHandler::new(
            github,
            store.clone(),
            sender.clone(),
        )),
        Arc::new(StackOverflowUpdateHandler::new(
            stackoverflow,
            store.clone(),
            sender,
        )),
    ];
    let processor = LinkProcessor::new(handlers, config.max_in_flight);

    let scheduler = Arc::new(Scheduler::new(
        store,
        processor,
        config.scan_interval,
        config.page_size,
    ));
    scheduler.start().await?;
    Ok(())
}
