//! Repo Analyst - Console Entry Point
//!
//! Wires the GitHub tools and the Azure OpenAI model into an agent and
//! starts the interactive loop on stdin/stdout.

use std::sync::Arc;

use anyhow::Context;
use repo_analyst::agent::{ChatCompletionAgent, TemplateVariables, DEFAULT_INSTRUCTIONS};
use repo_analyst::github::GitHubClient;
use repo_analyst::llm::AzureOpenAiClient;
use repo_analyst::repl::{Session, SystemClock};
use repo_analyst::tools::ToolRegistry;
use repo_analyst::Config;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the conversation.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_analyst=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(
        deployment = %config.azure.deployment,
        repository = %config.repository,
        "Loaded configuration"
    );

    println!("Initialize plugins...");
    let github = Arc::new(GitHubClient::new(&config.github)?);
    let user = github
        .get_user_profile()
        .await
        .context("Failed to fetch the GitHub user profile")?;
    info!(login = %user.login, "Authenticated with GitHub");
    let tools = ToolRegistry::github(github);

    println!("Creating kernel...");
    let llm = Arc::new(AzureOpenAiClient::new(&config.azure)?);

    println!("Defining agent...");
    let agent = ChatCompletionAgent::new(config.agent_name.clone(), llm)
        .with_instructions(DEFAULT_INSTRUCTIONS)
        .with_tools(tools)
        .with_arguments(
            TemplateVariables::new()
                .with("repository", config.repository.as_str())
                .with("user.username", user.login.as_str()),
        )
        .with_max_iterations(config.max_iterations);

    println!("Ready!");

    let mut session = Session::new(config.repository.as_str(), user.login.as_str(), SystemClock)
        .with_turn_error_policy(config.on_turn_error);
    let mut stdout = tokio::io::stdout();
    session
        .run(&agent, BufReader::new(tokio::io::stdin()), &mut stdout)
        .await?;

    info!(thread = %session.thread().id(), messages = session.thread().len(), "Session ended");
    Ok(())
}
