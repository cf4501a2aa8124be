//! Azure OpenAI chat-completions client.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use url::Url;

use super::sse::{data_payloads, parse_chunk};
use super::{ChatMessage, ChatStream, LlmClient, LlmError, ToolDefinition};
use crate::config::AzureOpenAiConfig;

/// Streams completions from an Azure OpenAI chat deployment.
pub struct AzureOpenAiClient {
    client: reqwest::Client,
    url: Url,
    api_key: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

impl AzureOpenAiClient {
    pub fn new(config: &AzureOpenAiConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-analyst/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: completions_url(&config.endpoint, &config.deployment, &config.api_version),
            api_key: config.api_key.clone(),
        })
    }
}

/// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`
fn completions_url(endpoint: &Url, deployment: &str, api_version: &str) -> Url {
    let mut url = endpoint.clone();
    let path = format!(
        "{}/openai/deployments/{}/chat/completions",
        endpoint.path().trim_end_matches('/'),
        urlencoding::encode(deployment)
    );
    url.set_path(&path);
    url.query_pairs_mut().clear().append_pair("api-version", api_version);
    url
}

/// Pull `error.message` out of an OpenAI-style error body, falling back to
/// the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl LlmClient for AzureOpenAiClient {
    async fn chat_completion_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatStream, LlmError> {
        let request = CompletionRequest {
            messages,
            stream: true,
            tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
        };

        tracing::debug!(
            messages = messages.len(),
            tools = tools.len(),
            "Requesting chat completion"
        );

        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Chat completion request rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let events = data_payloads(response.bytes_stream()).flat_map(|payload| {
            let decoded = payload.and_then(|data| parse_chunk(&data));
            let items: Vec<Result<_, LlmError>> = match decoded {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures::stream::iter(items)
        });

        Ok(Box::pin(events))
    }
}
