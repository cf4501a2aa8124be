//! Core agent loop implementation.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::llm::{ChatMessage, LlmClient, StreamEvent, ToolCall, ToolCallAccumulator};
use crate::tools::ToolRegistry;

use super::prompt::{render_template, DEFAULT_INSTRUCTIONS};
use super::{AgentClient, ChatThread, ResponseFragment, ResponseStream, TemplateVariables};

const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Chat-completion agent with tools.
pub struct ChatCompletionAgent {
    name: String,
    instructions: String,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    arguments: TemplateVariables,
    max_iterations: usize,
}

impl ChatCompletionAgent {
    /// Create an agent with the default instructions and no tools.
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.into(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            llm,
            tools: ToolRegistry::new(),
            arguments: TemplateVariables::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Default template variables; per-turn variables override them.
    pub fn with_arguments(mut self, arguments: TemplateVariables) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    fn run_turn<'a>(
        &'a self,
        thread: &'a mut ChatThread,
        message: ChatMessage,
        variables: TemplateVariables,
    ) -> impl Stream<Item = anyhow::Result<ResponseFragment>> + Send + 'a {
        async_stream::try_stream! {
            let variables = self.arguments.merged(&variables);
            let system_prompt = render_template(&self.instructions, &variables);
            let tool_schemas = self.tools.get_tool_schemas();

            // Messages produced this turn; committed to the thread on success.
            let mut pending = vec![message];

            for iteration in 0..self.max_iterations {
                tracing::debug!(thread = %thread.id(), iteration = iteration + 1, "Agent iteration");

                let mut messages = Vec::with_capacity(thread.len() + pending.len() + 1);
                messages.push(ChatMessage::system(system_prompt.clone()));
                messages.extend(thread.messages().iter().cloned());
                messages.extend(pending.iter().cloned());

                let mut events = self.llm.chat_completion_stream(&messages, &tool_schemas).await?;
                let mut text = String::new();
                let mut calls = ToolCallAccumulator::default();

                while let Some(event) = events.next().await {
                    match event? {
                        StreamEvent::TextDelta(delta) => {
                            text.push_str(&delta);
                            yield ResponseFragment {
                                author: self.name.clone(),
                                content: delta,
                            };
                        }
                        StreamEvent::ToolCallDelta { index, id, name, arguments } => {
                            calls.push(index, id, name, &arguments);
                        }
                        StreamEvent::Finished { reason } => {
                            tracing::debug!(reason = %reason, "Completion finished");
                        }
                    }
                }

                if calls.is_empty() {
                    pending.push(ChatMessage::assistant(text));
                    thread.append(pending);
                    return;
                }

                let tool_calls = calls.finish();
                pending.push(ChatMessage::assistant_tool_calls(text, tool_calls.clone()));
                for tool_call in &tool_calls {
                    let result = self.execute_tool_call(tool_call).await;
                    pending.push(ChatMessage::tool(tool_call.id.clone(), result));
                }
            }

            Err::<(), _>(anyhow::anyhow!(
                "Max iterations ({}) reached without a final response",
                self.max_iterations
            ))?;
        }
    }

    /// Execute a single tool call. Failures are reported back to the model.
    async fn execute_tool_call(&self, tool_call: &ToolCall) -> String {
        tracing::info!(
            tool = %tool_call.function.name,
            args = %tool_call.function.arguments,
            "Calling tool"
        );

        let args: serde_json::Value = if tool_call.function.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&tool_call.function.arguments) {
                Ok(args) => args,
                Err(e) => return format!("Error: invalid JSON arguments: {}", e),
            }
        };

        match self.tools.execute(&tool_call.function.name, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %tool_call.function.name, error = %e, "Tool failed");
                format!("Error: {:#}", e)
            }
        }
    }
}

impl AgentClient for ChatCompletionAgent {
    fn invoke<'a>(
        &'a self,
        thread: &'a mut ChatThread,
        message: ChatMessage,
        variables: TemplateVariables,
    ) -> ResponseStream<'a> {
        Box::pin(self.run_turn(thread, message, variables))
    }
}
