//! Agent module - the chat-completion agent behind the REPL.
//!
//! The agent follows a "tools in a loop" pattern per turn:
//! 1. Render the system prompt with the turn's template variables
//! 2. Stream a completion with the thread history and the new message
//! 3. If the model requests tool calls, execute them and feed results back
//! 4. Repeat until the model replies without tool calls or max iterations

mod agent_loop;
mod prompt;
mod thread;
mod variables;

use std::fmt;
use std::pin::Pin;

use futures::Stream;

use crate::llm::ChatMessage;

pub use agent_loop::ChatCompletionAgent;
pub use prompt::{render_template, DEFAULT_INSTRUCTIONS};
pub use thread::ChatThread;
pub use variables::TemplateVariables;

/// A piece of the agent's reply, printed as soon as it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFragment {
    /// Name of the agent that produced the text
    pub author: String,
    pub content: String,
}

impl fmt::Display for ResponseFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Lazy, finite, single-use sequence of fragments for one turn.
pub type ResponseStream<'a> = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseFragment>> + Send + 'a>>;

/// Turns a user message plus template variables into streamed fragments.
///
/// The thread is borrowed for the whole turn; implementations append the
/// user message and the assembled reply once the turn completes.
pub trait AgentClient: Send + Sync {
    fn invoke<'a>(
        &'a self,
        thread: &'a mut ChatThread,
        message: ChatMessage,
        variables: TemplateVariables,
    ) -> ResponseStream<'a>;
}
