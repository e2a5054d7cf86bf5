//! GitHub resource client.
//!
//! Fetches open issues and pull requests for a repository and filters
//! them client-side to those created strictly after the caller's
//! cutoff. All calls go through the shared retry policy and circuit
//! breaker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::errors::ApiError;
use crate::resilience::{self, BreakerConfig, CircuitBreaker, RetryPolicy};

/// `owner/repo` extracted from a repository URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRepo {
    pub owner: String,
    pub repo: String,
}

impl GithubRepo {
    /// Parse a `github.com` URL path. Extra path segments (e.g.
    /// `/issues`) are tolerated; fewer than two segments is a malformed
    /// link.
    pub fn from_url(url: &Url) -> Option<GithubRepo> {
        let mut segments = url
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty());
        let owner = segments.next()?.to_string();
        let repo = segments.next()?.to_string();
        Some(GithubRepo { owner, repo })
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GithubUser {
    pub login: String,
    #[serde(rename = "html_url")]
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GithubItem {
    pub title: String,
    pub body: Option<String>,
    pub user: GithubUser,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "html_url")]
    pub url: String,
    // Present (possibly as an object) when the "issue" is a PR.
    pull_request: Option<serde_json::Value>,
}

impl GithubItem {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[async_trait]
pub trait GithubApi: Send + Sync {
    /// Items from `/repos/{owner}/{repo}/{endpoint}` created strictly
    /// after `since`. No ordering is guaranteed.
    async fn fetch_items(
        &self,
        endpoint: &str,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GithubItem>, ApiError>;
}

pub struct GithubClient {
    client: reqwest::Client,
    token: SecretString,
    api_url: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl GithubClient {
    pub fn new(token: SecretString, api_url: String) -> Self {
        GithubClient {
            client: reqwest::Client::new(),
            token,
            api_url,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::new(BreakerConfig::default()),
        }
    }

    async fn fetch_once(
        &self,
        endpoint: &str,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GithubItem>, ApiError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/{endpoint}?state=open&sort=created&direction=desc",
            self.api_url
        );
        tracing::debug!("github request: {url}");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::USER_AGENT, "linktracker")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::status(status, body, retry_after));
        }

        let items: Vec<GithubItem> = resp.json().await?;
        Ok(items
            .into_iter()
            .filter(|item| item.created_at > since)
            .collect())
    }
}

pub(crate) fn parse_retry_after(
    headers: &reqwest::header::HeaderMap,
) -> Option<std::time::Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn fetch_items(
        &self,
        endpoint: &str,
        owner: &str,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GithubItem>, ApiError> {
        resilience::call("github", &self.breaker, &self.retry, Vec::new, || {
            self.fetch_once(endpoint, owner, repo, since)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn parses_repository_urls() {
        let repo = GithubRepo::from_url(&url("https://github.com/rust-lang/rust")).unwrap();
        assert_eq!(repo.owner, "rust-lang");
        assert_eq!(repo.repo, "rust");

        // trailing slash and extra segments are fine
        let repo = GithubRepo::from_url(&url("https://github.com/o/r/issues/12/")).unwrap();
        assert_eq!(repo.owner, "o");
        assert_eq!(repo.repo, "r");
    }

    #[test]
    fn rejects_short_paths() {
        assert_eq!(GithubRepo::from_url(&url("https://github.com/")), None);
        assert_eq!(
            GithubRepo::from_url(&url("https://github.com/only-owner")),
            None
        );
    }

    #[test]
    fn deserializes_issue_and_pr_items() {
        let raw = r#"[
            {
                "title": "Found a bug",
                "body": "it crashes",
                "user": { "login": "bob", "html_url": "https://github.com/bob" },
                "created_at": "2024-05-01T12:00:00Z",
                "updated_at": "2024-05-02T09:30:00Z",
                "html_url": "https://github.com/o/r/issues/1"
            },
            {
                "title": "Fix the bug",
                "body": null,
                "user": { "login": "alice" },
                "created_at": "2024-05-03T08:00:00Z",
                "html_url": "https://github.com/o/r/pull/2",
                "pull_request": { "url": "https://api.github.com/repos/o/r/pulls/2" }
            }
        ]"#;
        let items: Vec<GithubItem> = serde_json::from_str(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert!(!items[0].is_pull_request());
        assert!(items[1].is_pull_request());
        assert_eq!(items[0].user.login, "bob");
        assert_eq!(items[1].body, None);
    }

    #[test]
    fn retry_after_header_is_parsed_as_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(
            parse_retry_after(&headers),
            Some(std::time::Duration::from_secs(7))
        );
        headers.insert(reqwest::header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }
}
