//! Configuration management for Repo Analyst.
//!
//! Configuration can be set via environment variables:
//! - `AZURE_OPENAI_ENDPOINT` - Required. Azure OpenAI resource endpoint.
//! - `AZURE_OPENAI_API_KEY` - Required. Azure OpenAI API key.
//! - `AZURE_OPENAI_CHAT_DEPLOYMENT` - Required. Chat model deployment name.
//! - `AZURE_OPENAI_API_VERSION` - Optional. Defaults to `2024-10-21`.
//! - `GITHUB_TOKEN` - Optional. Personal access token for the GitHub API.
//! - `GITHUB_BASE_URL` - Optional. Defaults to `https://api.github.com`.
//! - `REPOSITORY` - Optional. Repository under analysis. Defaults to `microsoft/semantic-kernel`.
//! - `AGENT_NAME` - Optional. Defaults to `SampleAssistantAgent`.
//! - `MAX_ITERATIONS` - Optional. Maximum model calls per turn. Defaults to `10`.
//! - `ON_TURN_ERROR` - Optional. `continue` or `abort`. Defaults to `continue`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_VERSION: &str = "2024-10-21";
pub const DEFAULT_GITHUB_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_REPOSITORY: &str = "microsoft/semantic-kernel";
pub const DEFAULT_AGENT_NAME: &str = "SampleAssistantAgent";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Azure OpenAI connection settings.
#[derive(Clone)]
pub struct AzureOpenAiConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com/`
    pub endpoint: Url,

    /// API key sent in the `api-key` header
    pub api_key: String,

    /// Chat model deployment name
    pub deployment: String,

    /// REST API version query parameter
    pub api_version: String,
}

impl fmt::Debug for AzureOpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"<redacted>")
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// GitHub REST API settings.
#[derive(Clone)]
pub struct GitHubConfig {
    /// API base URL (GitHub Enterprise installs use `https://host/api/v3`)
    pub base_url: Url,

    /// Bearer token; requests are unauthenticated when absent
    pub token: Option<String>,
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What the REPL does when a turn fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnErrorPolicy {
    /// Report the error and prompt for the next line.
    #[default]
    Continue,
    /// Propagate the error and end the process.
    Abort,
}

impl FromStr for TurnErrorPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(format!("expected 'continue' or 'abort', got: {}", other)),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// LLM backend
    pub azure: AzureOpenAiConfig,

    /// Profile lookup / tool backend
    pub github: GitHubConfig,

    /// Repository under analysis (`owner/name`)
    pub repository: String,

    /// Agent display name
    pub agent_name: String,

    /// Maximum model calls per turn (tool round-trips included)
    pub max_iterations: usize,

    /// Per-turn failure handling
    pub on_turn_error: TurnErrorPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if one of the `AZURE_OPENAI_*`
    /// required variables is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let azure = AzureOpenAiConfig {
            endpoint: parse_url("AZURE_OPENAI_ENDPOINT", &required("AZURE_OPENAI_ENDPOINT")?)?,
            api_key: required("AZURE_OPENAI_API_KEY")?,
            deployment: required("AZURE_OPENAI_CHAT_DEPLOYMENT")?,
            api_version: optional("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        };

        let github = GitHubConfig {
            base_url: parse_url(
                "GITHUB_BASE_URL",
                &optional("GITHUB_BASE_URL").unwrap_or_else(|| DEFAULT_GITHUB_BASE_URL.to_string()),
            )?,
            token: optional("GITHUB_TOKEN"),
        };

        let repository = optional("REPOSITORY").unwrap_or_else(|| DEFAULT_REPOSITORY.to_string());
        if split_repository(&repository).is_none() {
            return Err(ConfigError::InvalidValue(
                "REPOSITORY".to_string(),
                format!("expected 'owner/name', got: {}", repository),
            ));
        }

        let agent_name = optional("AGENT_NAME").unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string());

        let max_iterations = optional("MAX_ITERATIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue("MAX_ITERATIONS".to_string(), format!("{}", e)))?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let on_turn_error = optional("ON_TURN_ERROR")
            .map(|v| v.parse::<TurnErrorPolicy>().map_err(|e| ConfigError::InvalidValue("ON_TURN_ERROR".to_string(), e)))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            azure,
            github,
            repository,
            agent_name,
            max_iterations,
            on_turn_error,
        })
    }
}

/// Split `owner/name` into its two non-empty halves.
pub fn split_repository(repository: &str) -> Option<(&str, &str)> {
    let (owner, name) = repository.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("unsupported scheme: {}", other),
        )),
    }
}
