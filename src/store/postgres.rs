//! Postgres-backed [`LinkStore`].
//!
//! The schema is three tables: `links` (one row per canonical URL),
//! `subscriptions` (chat <-> link with chat-scoped tags/filters) and
//! `watermarks` (one row per link and cursor kind). Watermark
//! advancement uses `GREATEST` so a concurrent writer can never move a
//! cursor backwards.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Client as DbClient;
use url::Url;

use super::{LinkStore, TrackedLink, WatermarkKind};

const MIGRATIONS: &[&str] = &[
    "
CREATE TABLE IF NOT EXISTS links (
    id BIGSERIAL PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
);
",
    "
CREATE TABLE IF NOT EXISTS subscriptions (
    chat_id BIGINT NOT NULL,
    link_id BIGINT NOT NULL REFERENCES links (id) ON DELETE CASCADE,
    tags TEXT[] NOT NULL DEFAULT '{}',
    filters TEXT[] NOT NULL DEFAULT '{}',
    PRIMARY KEY (chat_id, link_id)
);
",
    "
CREATE TABLE IF NOT EXISTS watermarks (
    link_id BIGINT NOT NULL REFERENCES links (id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    value TIMESTAMP WITH TIME ZONE NOT NULL,
    PRIMARY KEY (link_id, kind)
);
",
];

pub struct PostgresStore {
    db: DbClient,
}

impl PostgresStore {
    /// Connect and run migrations. The connection task is spawned onto
    /// the current runtime and logs on unexpected termination.
    pub async fn connect(db_url: &str) -> Result<Self> {
        let (db, connection) = tokio_postgres::connect(db_url, tokio_postgres::NoTls)
            .await
            .context("failed to connect to the database")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("database connection error: {e}");
            }
        });
        let store = PostgresStore { db };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        for migration in MIGRATIONS {
            self.db
                .execute(*migration, &[])
                .await
                .with_context(|| format!("running migration: {migration}"))?;
        }
        Ok(())
    }

    /// Subscribe a chat to a URL, creating the link row on first track.
    pub async fn track(
        &self,
        chat_id: i64,
        url: &Url,
        tags: &[String],
        filters: &[String],
    ) -> Result<i64> {
        let row = self
            .db
            .query_one(
                "INSERT INTO links (url) VALUES ($1)
                 ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url
                 RETURNING id",
                &[&url.as_str()],
            )
            .await
            .context("upserting link")?;
        let link_id: i64 = row.get(0);

        self.db
            .execute(
                "INSERT INTO subscriptions (chat_id, link_id, tags, filters)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (chat_id, link_id)
                 DO UPDATE SET tags = EXCLUDED.tags, filters = EXCLUDED.filters",
                &[&chat_id, &link_id, &tags.to_vec(), &filters.to_vec()],
            )
            .await
            .context("inserting subscription")?;

        Ok(link_id)
    }

    /// Drop a chat's subscription; deletes the link when the last
    /// subscriber goes away.
    pub async fn untrack(&self, chat_id: i64, link_id: i64) -> Result<()> {
        self.db
            .execute(
                "DELETE FROM subscriptions WHERE chat_id = $1 AND link_id = $2",
                &[&chat_id, &link_id],
            )
            .await
            .context("deleting subscription")?;

        self.db
            .execute(
                "DELETE FROM links
                 WHERE id = $1
                 AND NOT EXISTS (SELECT 1 FROM subscriptions WHERE link_id = $1)",
                &[&link_id],
            )
            .await
            .context("deleting orphaned link")?;

        Ok(())
    }
}

#[async_trait]
impl LinkStore for PostgresStore {
    async fn page_of_links(&self, page: usize, page_size: usize) -> Result<Vec<TrackedLink>> {
        let limit = page_size as i64;
        let offset = (page * page_size) as i64;
        let rows = self
            .db
            .query(
                "SELECT id, url FROM links ORDER BY id LIMIT $1 OFFSET $2",
                &[&limit, &offset],
            )
            .await
            .context("querying links page")?;

        let mut links = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get(0);
            let raw: String = row.get(1);
            let url = Url::parse(&raw).with_context(|| format!("stored url is invalid: {raw}"))?;
            links.push(TrackedLink {
                id,
                url,
                tags: Vec::new(),
                filters: Vec::new(),
            });
        }
        if links.is_empty() {
            return Ok(links);
        }

        // Filters and tags are chat-scoped; the pipeline sees the union
        // across subscribers of each link.
        let ids: Vec<i64> = links.iter().map(|l| l.id).collect();
        let rows = self
            .db
            .query(
                "SELECT link_id, tags, filters FROM subscriptions WHERE link_id = ANY($1)",
                &[&ids],
            )
            .await
            .context("querying subscription tags/filters")?;
        for row in rows {
            let link_id: i64 = row.get(0);
            let tags: Vec<String> = row.get(1);
            let filters: Vec<String> = row.get(2);
            if let Some(link) = links.iter_mut().find(|l| l.id == link_id) {
                for tag in tags {
                    if !link.tags.contains(&tag) {
                        link.tags.push(tag);
                    }
                }
                for filter in filters {
                    if !link.filters.contains(&filter) {
                        link.filters.push(filter);
                    }
                }
            }
        }

        Ok(links)
    }

    async fn chat_ids_for_link(&self, link_id: i64) -> Result<Vec<i64>> {
        let rows = self
            .db
            .query(
                "SELECT chat_id FROM subscriptions WHERE link_id = $1 ORDER BY chat_id",
                &[&link_id],
            )
            .await
            .context("querying chat ids for link")?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn watermark(
        &self,
        link_id: i64,
        kind: WatermarkKind,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = self
            .db
            .query_opt(
                "SELECT value FROM watermarks WHERE link_id = $1 AND kind = $2",
                &[&link_id, &kind.as_str()],
            )
            .await
            .context("querying watermark")?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn advance_watermark(
        &self,
        link_id: i64,
        kind: WatermarkKind,
        to: DateTime<Utc>,
    ) -> Result<()> {
        self.db
            .execute(
                "INSERT INTO watermarks (link_id, kind, value) VALUES ($1, $2, $3)
                 ON CONFLICT (link_id, kind)
                 DO UPDATE SET value = GREATEST(watermarks.value, EXCLUDED.value)",
                &[&link_id, &kind.as_str(), &to],
            )
            .await
            .context("advancing watermark")?;
        Ok(())
    }
}
