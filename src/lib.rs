//! # Repo Analyst
//!
//! An interactive GitHub repository analyst running in the terminal.
//!
//! This library provides:
//! - A chat-completion agent that streams replies from Azure OpenAI
//! - A small set of read-only GitHub tools the agent can call
//! - A line-based REPL that drives the conversation
//!
//! ## Architecture
//!
//! Each turn follows the "tools in a loop" pattern:
//! 1. Render the system prompt with fresh template variables
//! 2. Stream a completion for the thread plus the new user message
//! 3. If the model requests tool calls, run them and feed results back
//! 4. Repeat until the model produces a reply without tool calls
//!
//! ## Example
//!
//! ```rust,ignore
//! use repo_analyst::{config::Config, github::GitHubClient};
//!
//! let config = Config::from_env()?;
//! let github = GitHubClient::new(&config.github)?;
//! let profile = github.get_user_profile().await?;
//! ```

pub mod agent;
pub mod config;
pub mod github;
pub mod llm;
pub mod repl;
pub mod tools;

pub use config::Config;
