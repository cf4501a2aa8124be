//! GitHub REST response types (the subset the agent reads).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Login name (the `user.username` template variable)
    pub login: String,

    pub id: u64,

    /// Display name, if set
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub company: Option<String>,

    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub html_url: String,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

/// An issue together with its body text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetail {
    #[serde(flatten)]
    pub issue: Issue,
    #[serde(default)]
    pub body: Option<String>,
}

/// Issue state filter for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
    All,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        }
    }
}

/// Filters for `GitHubClient::get_issues`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueQuery {
    /// Page size; clamped to `1..=100`
    pub max_results: u32,
    pub state: IssueState,
    pub label: Option<String>,
    pub assignee: Option<String>,
}

impl Default for IssueQuery {
    fn default() -> Self {
        Self {
            max_results: 10,
            state: IssueState::Open,
            label: None,
            assignee: None,
        }
    }
}
