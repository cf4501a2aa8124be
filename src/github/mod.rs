//! Read-only GitHub REST client.
//!
//! Backs the startup profile lookup and the agent's GitHub tools.

mod types;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::config::GitHubConfig;

pub use types::{Issue, IssueDetail, IssueQuery, IssueState, Label, Repository, UserProfile};

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid GitHub token: {0}")]
    InvalidToken(String),
}

/// Thin wrapper around the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| GitHubError::InvalidToken(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-analyst/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Profile of the user the token belongs to.
    pub async fn get_user_profile(&self) -> Result<UserProfile, GitHubError> {
        self.get_json(&["user"], &[]).await
    }

    pub async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GitHubError> {
        self.get_json(&["repos", owner, repo], &[]).await
    }

    pub async fn get_issues(
        &self,
        owner: &str,
        repo: &str,
        query: &IssueQuery,
    ) -> Result<Vec<Issue>, GitHubError> {
        let mut params = vec![
            ("per_page", query.max_results.clamp(1, 100).to_string()),
            ("state", query.state.as_str().to_string()),
        ];
        if let Some(label) = &query.label {
            params.push(("labels", label.clone()));
        }
        if let Some(assignee) = &query.assignee {
            params.push(("assignee", assignee.clone()));
        }
        self.get_json(&["repos", owner, repo, "issues"], &params).await
    }

    pub async fn get_issue_details(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<IssueDetail, GitHubError> {
        let number = number.to_string();
        self.get_json(&["repos", owner, repo, "issues", &number], &[]).await
    }

    /// Build `{base}/{segments...}`; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        let path = segments.iter().fold(
            url.path().trim_end_matches('/').to_string(),
            |mut path, segment| {
                path.push('/');
                path.push_str(&urlencoding::encode(segment));
                path
            },
        );
        url.set_path(&path);
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        let url = self.endpoint(segments);
        tracing::debug!(url = %url, "GitHub request");

        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| body.trim().to_string());
            return Err(GitHubError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}
