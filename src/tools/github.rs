//! GitHub lookup tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::{required_str, Tool};
use crate::github::{GitHubClient, IssueQuery, IssueState};

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Get the profile of the current user.
pub struct GetUserProfile {
    client: Arc<GitHubClient>,
}

impl GetUserProfile {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetUserProfile {
    fn name(&self) -> &str {
        "get_user_profile"
    }

    fn description(&self) -> &str {
        "Get the GitHub profile (login, name, company) of the user you are assisting."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> anyhow::Result<String> {
        to_json(&self.client.get_user_profile().await?)
    }
}

/// Get repository metadata.
pub struct GetRepository {
    client: Arc<GitHubClient>,
}

impl GetRepository {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetRepository {
    fn name(&self) -> &str {
        "get_repository"
    }

    fn description(&self) -> &str {
        "Get details of a GitHub repository: description, default branch, stars and open issue count."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": {
                    "type": "string",
                    "description": "Repository owner (user or organization), e.g. 'microsoft'"
                },
                "repo": {
                    "type": "string",
                    "description": "Repository name, e.g. 'semantic-kernel'"
                }
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let owner = required_str(&args, "owner")?;
        let repo = required_str(&args, "repo")?;
        to_json(&self.client.get_repository(owner, repo).await?)
    }
}

/// List repository issues.
pub struct GetIssues {
    client: Arc<GitHubClient>,
}

impl GetIssues {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetIssues {
    fn name(&self) -> &str {
        "get_issues"
    }

    fn description(&self) -> &str {
        "List issues of a GitHub repository, optionally filtered by state, label or assignee."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": {
                    "type": "string",
                    "description": "Repository owner"
                },
                "repo": {
                    "type": "string",
                    "description": "Repository name"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of issues to return (default: 10, max: 100)"
                },
                "state": {
                    "type": "string",
                    "enum": ["open", "closed", "all"],
                    "description": "Issue state filter (default: open)"
                },
                "label": {
                    "type": "string",
                    "description": "Optional: only issues with this label"
                },
                "assignee": {
                    "type": "string",
                    "description": "Optional: only issues assigned to this login"
                }
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let owner = required_str(&args, "owner")?;
        let repo = required_str(&args, "repo")?;
        let query = issue_query(&args)?;
        to_json(&self.client.get_issues(owner, repo, &query).await?)
    }
}

fn issue_query(args: &Value) -> anyhow::Result<IssueQuery> {
    let defaults = IssueQuery::default();
    let state = match args["state"].as_str() {
        None => defaults.state,
        Some(s) => serde_json::from_value::<IssueState>(Value::String(s.to_lowercase()))
            .map_err(|_| anyhow::anyhow!("Invalid 'state' argument: {}", s))?,
    };
    let max_results = args["max_results"]
        .as_u64()
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(defaults.max_results);

    Ok(IssueQuery {
        max_results,
        state,
        label: args["label"].as_str().map(str::to_string),
        assignee: args["assignee"].as_str().map(str::to_string),
    })
}

/// Get a single issue with its body.
pub struct GetIssueDetails {
    client: Arc<GitHubClient>,
}

impl GetIssueDetails {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetIssueDetails {
    fn name(&self) -> &str {
        "get_issue_details"
    }

    fn description(&self) -> &str {
        "Get the full details of one GitHub issue, including its body text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": {
                    "type": "string",
                    "description": "Repository owner"
                },
                "repo": {
                    "type": "string",
                    "description": "Repository name"
                },
                "issue_number": {
                    "type": "integer",
                    "description": "The issue number"
                }
            },
            "required": ["owner", "repo", "issue_number"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let owner = required_str(&args, "owner")?;
        let repo = required_str(&args, "repo")?;
        // Models sometimes send numbers as strings
        let number = args["issue_number"]
            .as_u64()
            .or_else(|| args["issue_number"].as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| anyhow::anyhow!("Missing 'issue_number' argument"))?;
        to_json(&self.client.get_issue_details(owner, repo, number).await?)
    }
}
