//! Tools the agent can call, and the static registry that holds them.

mod github;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::github::GitHubClient;
use crate::llm::ToolDefinition;

pub use github::{GetIssueDetails, GetIssues, GetRepository, GetUserProfile};

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool.
    fn name(&self) -> &str;

    /// What the tool does, shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool with already-decoded arguments.
    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Fixed set of tools, registered at construction.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with no tools.
    pub fn new() -> Self {
        Self::default()
    }

    /// The GitHub plugin: profile, repository and issue lookups.
    pub fn github(client: Arc<GitHubClient>) -> Self {
        Self::new()
            .with(GetUserProfile::new(client.clone()))
            .with(GetRepository::new(client.clone()))
            .with(GetIssues::new(client.clone()))
            .with(GetIssueDetails::new(client))
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Schemas advertised to the model.
    pub fn get_tool_schemas(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition::function(t.name(), t.description(), t.parameters_schema()))
            .collect()
    }

    /// Run the tool called `name`.
    pub async fn execute(&self, name: &str, args: Value) -> anyhow::Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
        tool.execute(args).await
    }
}

/// Pull a required string argument.
fn required_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args[key]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}
