//! Stack Overflow resource client.
//!
//! Talks to the Stack Exchange API (`/questions/{id}/answers` and
//! `/questions/{id}/comments`), asking the server for items created
//! after the cutoff via `fromdate`. Answers and comments share one
//! circuit breaker since they hit the same upstream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use crate::errors::ApiError;
use crate::github::parse_retry_after;
use crate::resilience::{self, BreakerConfig, CircuitBreaker, RetryPolicy};

/// Question id from a `stackoverflow.com/questions/{id}/...` URL.
pub fn question_id(url: &Url) -> Option<u64> {
    let mut segments = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty());
    if segments.next()? != "questions" {
        return None;
    }
    segments.next()?.parse().ok()
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Owner {
    pub display_name: Option<String>,
    pub user_id: Option<u64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Answer {
    pub answer_id: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub owner: Owner,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Comment {
    pub comment_id: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub owner: Owner,
}

#[derive(Debug, serde::Deserialize)]
struct ItemsWrapper<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[async_trait]
pub trait StackOverflowApi: Send + Sync {
    async fn new_answers(
        &self,
        question_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Answer>, ApiError>;

    async fn new_comments(
        &self,
        question_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Comment>, ApiError>;
}

pub struct StackOverflowClient {
    client: reqwest::Client,
    api_url: String,
    key: String,
    access_token: SecretString,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl StackOverflowClient {
    pub fn new(key: String, access_token: SecretString, api_url: String) -> Self {
        StackOverflowClient {
            client: reqwest::Client::new(),
            api_url,
            key,
            access_token,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::new(BreakerConfig::default()),
        }
    }

    async fn fetch_once<T: DeserializeOwned>(
        &self,
        question_id: u64,
        endpoint: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<T>, ApiError> {
        let url = format!("{}/questions/{question_id}/{endpoint}", self.api_url);
        tracing::debug!("stackoverflow request: {url}");
        // `fromdate` is inclusive server-side; the contract is strictly
        // after `since`.
        let fromdate = (since.timestamp() + 1).to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("site", "stackoverflow"),
                ("order", "desc"),
                ("sort", "creation"),
                ("fromdate", fromdate.as_str()),
                ("filter", "withbody"),
                ("key", self.key.as_str()),
                ("access_token", self.access_token.expose_secret()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::status(status, body, retry_after));
        }

        let wrapper: ItemsWrapper<T> = resp.json().await?;
        Ok(wrapper.items)
    }
}

#[async_trait]
impl StackOverflowApi for StackOverflowClient {
    async fn new_answers(
        &self,
        question_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Answer>, ApiError> {
        resilience::call("stackoverflow", &self.breaker, &self.retry, Vec::new, || {
            self.fetch_once(question_id, "answers", since)
        })
        .await
    }

    async fn new_comments(
        &self,
        question_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Comment>, ApiError> {
        resilience::call("stackoverflow", &self.breaker, &self.retry, Vec::new, || {
            self.fetch_once(question_id, "comments", since)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extracts_question_ids() {
        assert_eq!(
            question_id(&url("https://stackoverflow.com/questions/11227809/why-is-it-faster")),
            Some(11227809)
        );
        assert_eq!(
            question_id(&url("https://stackoverflow.com/questions/42")),
            Some(42)
        );
    }

    #[test]
    fn rejects_non_question_urls() {
        assert_eq!(question_id(&url("https://stackoverflow.com/users/1/bob")), None);
        assert_eq!(question_id(&url("https://stackoverflow.com/questions/abc")), None);
        assert_eq!(question_id(&url("https://stackoverflow.com/")), None);
    }

    #[test]
    fn deserializes_answers_with_epoch_timestamps() {
        let raw = r#"{
            "items": [
                {
                    "answer_id": 123,
                    "creation_date": 1714561200,
                    "body": "<p>use a map</p>",
                    "owner": { "display_name": "bob", "user_id": 7 }
                },
                { "answer_id": 124, "creation_date": 1714561300 }
            ],
            "has_more": false
        }"#;
        let wrapper: ItemsWrapper<Answer> = serde_json::from_str(raw).unwrap();
        assert_eq!(wrapper.items.len(), 2);
        assert_eq!(
            wrapper.items[0].creation_date,
            Utc.timestamp_opt(1714561200, 0).unwrap()
        );
        assert_eq!(wrapper.items[0].owner.display_name.as_deref(), Some("bob"));
        assert_eq!(wrapper.items[1].body, None);
        assert_eq!(wrapper.items[1].owner.display_name, None);
    }

    #[test]
    fn missing_items_field_means_empty() {
        let wrapper: ItemsWrapper<Comment> = serde_json::from_str(r#"{"has_more":false}"#).unwrap();
        assert!(wrapper.items.is_empty());
    }
}
