//! Interactive console loop.
//!
//! Reads one line at a time, forwards it to the agent with freshly computed
//! template variables and prints the reply fragments as they stream in.

use chrono::{Local, NaiveDateTime};
use futures::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::agent::{AgentClient, ChatThread, TemplateVariables};
use crate::config::TurnErrorPolicy;
use crate::llm::ChatMessage;

pub const EXIT_KEYWORD: &str = "EXIT";
pub const PROMPT: &str = "> ";

/// Source of the `now` template variable.
pub trait Clock: Send + Sync {
    /// Local wall-clock time.
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Short date plus short time, e.g. `10/17/2026 3:04 PM`.
pub fn format_timestamp(now: &NaiveDateTime) -> String {
    now.format("%-m/%-d/%Y %-I:%M %p").to_string()
}

/// What to do with a line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line: prompt again.
    Skip,
    /// Exit keyword: stop the loop.
    Exit,
    /// Anything else, sent as-is.
    Message(String),
}

pub fn classify(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Input::Skip
    } else if trimmed.eq_ignore_ascii_case(EXIT_KEYWORD) {
        Input::Exit
    } else {
        Input::Message(line.to_string())
    }
}

#[derive(Debug, Error)]
enum TurnError {
    #[error(transparent)]
    Agent(anyhow::Error),

    #[error("console write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Next line without its terminator, or `None` at end of input.
///
/// Invalid UTF-8 is replaced rather than rejected, so a stray byte never
/// ends the session.
async fn read_line<R>(input: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// One conversation: the thread plus the values that feed the prompt.
pub struct Session<C = SystemClock> {
    repository: String,
    username: String,
    clock: C,
    thread: ChatThread,
    on_turn_error: TurnErrorPolicy,
}

impl<C: Clock> Session<C> {
    pub fn new(repository: impl Into<String>, username: impl Into<String>, clock: C) -> Self {
        Self {
            repository: repository.into(),
            username: username.into(),
            clock,
            thread: ChatThread::new(),
            on_turn_error: TurnErrorPolicy::default(),
        }
    }

    pub fn with_turn_error_policy(mut self, policy: TurnErrorPolicy) -> Self {
        self.on_turn_error = policy;
        self
    }

    pub fn thread(&self) -> &ChatThread {
        &self.thread
    }

    /// Variables for a turn starting now.
    pub fn variables(&self) -> TemplateVariables {
        TemplateVariables::new()
            .with("now", format_timestamp(&self.clock.now()))
            .with("repository", self.repository.as_str())
            .with("user.username", self.username.as_str())
    }

    /// Run until the exit keyword or end of input.
    ///
    /// # Errors
    ///
    /// Console I/O failures always end the loop. Agent failures end it only
    /// under [`TurnErrorPolicy::Abort`].
    pub async fn run<A, R, W>(&mut self, agent: &A, mut input: R, output: &mut W) -> anyhow::Result<()>
    where
        A: AgentClient + ?Sized,
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            output.write_all(format!("\n{}", PROMPT).as_bytes()).await?;
            output.flush().await?;

            let Some(line) = read_line(&mut input).await? else {
                tracing::debug!("Input closed");
                return Ok(());
            };

            let text = match classify(&line) {
                Input::Skip => continue,
                Input::Exit => return Ok(()),
                Input::Message(text) => text,
            };

            match self.send_turn(agent, text, output).await {
                Ok(()) => {}
                Err(TurnError::Io(e)) => return Err(e.into()),
                Err(TurnError::Agent(e)) => match self.on_turn_error {
                    TurnErrorPolicy::Abort => return Err(e),
                    TurnErrorPolicy::Continue => {
                        tracing::error!(error = %format!("{:#}", e), "Turn failed");
                        output.write_all(format!("\nError: {:#}\n", e).as_bytes()).await?;
                        output.flush().await?;
                    }
                },
            }
        }
    }

    async fn send_turn<A, W>(&mut self, agent: &A, text: String, output: &mut W) -> Result<(), TurnError>
    where
        A: AgentClient + ?Sized,
        W: AsyncWrite + Unpin,
    {
        output.write_all(b"\n").await?;

        let variables = self.variables();
        tracing::debug!(
            thread = %self.thread.id(),
            now = variables.get("now").unwrap_or_default(),
            "Submitting turn"
        );

        let mut author = None;
        let mut fragments = agent.invoke(&mut self.thread, ChatMessage::user(text), variables);
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment.map_err(TurnError::Agent)?;
            output.write_all(fragment.to_string().as_bytes()).await?;
            output.flush().await?;
            if author.is_none() {
                author = Some(fragment.author);
            }
        }
        tracing::debug!(author = author.as_deref().unwrap_or("-"), "Turn complete");

        output.write_all(b"\n").await?;
        output.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ResponseFragment, ResponseStream};
    use chrono::{Duration, NaiveDate};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    /// Advances one minute every time it is read.
    struct StepClock {
        start: NaiveDateTime,
        ticks: AtomicI64,
    }

    impl StepClock {
        fn new() -> Self {
            Self {
                start: NaiveDate::from_ymd_opt(2026, 10, 17)
                    .unwrap()
                    .and_hms_opt(15, 4, 0)
                    .unwrap(),
                ticks: AtomicI64::new(0),
            }
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> NaiveDateTime {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.start + Duration::minutes(n)
        }
    }

    /// Replies with fixed fragments and records what it was sent.
    struct ScriptedAgent {
        fragments: Vec<&'static str>,
        fail_on: Option<&'static str>,
        calls: Mutex<Vec<(String, TemplateVariables)>>,
    }

    impl ScriptedAgent {
        fn new(fragments: Vec<&'static str>) -> Self {
            Self {
                fragments,
                fail_on: None,
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<(String, TemplateVariables)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AgentClient for ScriptedAgent {
        fn invoke<'a>(
            &'a self,
            thread: &'a mut ChatThread,
            message: ChatMessage,
            variables: TemplateVariables,
        ) -> ResponseStream<'a> {
            let content = message.content.clone().unwrap_or_default();
            self.calls.lock().unwrap().push((content.clone(), variables));

            if self.fail_on == Some(content.as_str()) {
                return Box::pin(futures::stream::iter(vec![Err(anyhow::anyhow!("boom"))]));
            }

            thread.append([message, ChatMessage::assistant(self.fragments.concat())]);
            let items: Vec<anyhow::Result<ResponseFragment>> = self
                .fragments
                .iter()
                .map(|f| {
                    Ok(ResponseFragment {
                        author: "Joe".to_string(),
                        content: f.to_string(),
                    })
                })
                .collect();
            Box::pin(futures::stream::iter(items))
        }
    }

    fn session() -> Session<StepClock> {
        Session::new("microsoft/semantic-kernel", "octocat", StepClock::new())
    }

    async fn run(session: &mut Session<StepClock>, agent: &ScriptedAgent, input: &str) -> (anyhow::Result<()>, String) {
        let mut output = Vec::new();
        let result = session.run(agent, input.as_bytes(), &mut output).await;
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn classifies_input_lines() {
        assert_eq!(classify(""), Input::Skip);
        assert_eq!(classify(" \t "), Input::Skip);
        assert_eq!(classify("exit"), Input::Exit);
        assert_eq!(classify("EXIT"), Input::Exit);
        assert_eq!(classify("ExIt"), Input::Exit);
        assert_eq!(classify("  exit  "), Input::Exit);
        assert_eq!(classify("exit now"), Input::Message("exit now".to_string()));
        assert_eq!(classify("  Hello "), Input::Message("  Hello ".to_string()));
    }

    #[test]
    fn timestamp_uses_short_date_and_time() {
        let morning = NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(9, 7, 59)
            .unwrap();
        assert_eq!(format_timestamp(&morning), "1/5/2026 9:07 AM");
        assert_eq!(format_timestamp(&StepClock::new().now()), "10/17/2026 3:04 PM");
    }

    #[tokio::test]
    async fn blank_lines_never_submit_a_turn() {
        let agent = ScriptedAgent::new(vec!["unused"]);
        let mut session = session();

        let (result, output) = run(&mut session, &agent, "   \n\t\n\nexit\n").await;

        result.expect("clean exit");
        assert!(agent.calls().is_empty());
        assert_eq!(output, "\n> \n> \n> \n> ");
    }

    #[tokio::test]
    async fn exit_keyword_is_case_insensitive() {
        for word in ["exit", "EXIT", "ExIt", "  eXiT\t"] {
            let agent = ScriptedAgent::new(vec!["unused"]);
            let mut session = session();

            let (result, output) = run(&mut session, &agent, &format!("{}\nHello\n", word)).await;

            result.expect("clean exit");
            assert!(agent.calls().is_empty(), "{word:?} submitted a turn");
            assert_eq!(output, "\n> ");
        }
    }

    #[tokio::test]
    async fn hello_turn_end_to_end() {
        let agent = ScriptedAgent::new(vec!["Hi ", "octocat", "!"]);
        let mut session = session();

        let (result, output) = run(&mut session, &agent, "   \nHello\nexit\n").await;

        result.expect("clean exit");
        let calls = agent.calls();
        assert_eq!(calls.len(), 1);
        let (message, variables) = &calls[0];
        assert_eq!(message, "Hello");
        assert_eq!(variables.get("repository"), Some("microsoft/semantic-kernel"));
        assert_eq!(variables.get("user.username"), Some("octocat"));
        assert_eq!(variables.get("now"), Some("10/17/2026 3:04 PM"));
        assert_eq!(variables.len(), 3);

        assert_eq!(output, "\n> \n> \nHi octocat!\n\n> ");
        assert_eq!(session.thread().len(), 2);
    }

    #[tokio::test]
    async fn now_is_recomputed_for_every_turn() {
        let agent = ScriptedAgent::new(vec!["ok"]);
        let mut session = session();

        let (result, output) = run(&mut session, &agent, "one\ntwo\nthree\n").await;

        result.expect("eof ends the loop");
        let calls = agent.calls();
        assert_eq!(calls.len(), 3);

        let nows: Vec<&str> = calls.iter().map(|(_, v)| v.get("now").unwrap()).collect();
        assert_eq!(nows, vec!["10/17/2026 3:04 PM", "10/17/2026 3:05 PM", "10/17/2026 3:06 PM"]);
        for (_, variables) in &calls {
            assert_eq!(variables.get("repository"), calls[0].1.get("repository"));
            assert_eq!(variables.get("user.username"), calls[0].1.get("user.username"));
        }

        // Each turn's reply is fully printed before the next prompt.
        assert_eq!(output, "\n> \nok\n\n> \nok\n\n> \nok\n\n> ");
    }

    #[tokio::test]
    async fn failed_turn_is_reported_and_loop_continues() {
        let mut agent = ScriptedAgent::new(vec!["fine"]);
        agent.fail_on = Some("break it");
        let mut session = session();

        let (result, output) = run(&mut session, &agent, "break it\nagain\nexit\n").await;

        result.expect("loop survives");
        assert_eq!(agent.calls().len(), 2);
        assert!(output.contains("\nError: boom\n"));
        assert!(output.ends_with("\nfine\n\n> "));
        assert_eq!(session.thread().len(), 2);
    }

    #[tokio::test]
    async fn abort_policy_propagates_turn_failure() {
        let mut agent = ScriptedAgent::new(vec!["fine"]);
        agent.fail_on = Some("break it");
        let mut session = session().with_turn_error_policy(TurnErrorPolicy::Abort);

        let (result, _) = run(&mut session, &agent, "break it\nagain\n").await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(agent.calls().len(), 1);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_sent_not_fatal() {
        let agent = ScriptedAgent::new(vec!["ok"]);
        let mut session = session();
        let mut output = Vec::new();

        let result = session
            .run(&agent, &b"caf\xe9\r\nexit\n"[..], &mut output)
            .await;

        result.expect("clean exit");
        let calls = agent.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "caf\u{FFFD}");
    }

    #[tokio::test]
    async fn final_line_without_newline_is_read() {
        let agent = ScriptedAgent::new(vec!["ok"]);
        let mut session = session();

        let (result, output) = run(&mut session, &agent, "Hello").await;

        result.expect("eof ends the loop");
        assert_eq!(agent.calls().len(), 1);
        assert_eq!(output, "\n> \nok\n\n> ");
    }

    #[tokio::test]
    async fn prompts_before_reading() {
        let agent = ScriptedAgent::new(vec![]);
        let mut session = session();
        let input = tokio::io::BufReader::new(tokio_test::io::Builder::new().read(b"exit\n").build());
        let mut output = tokio_test::io::Builder::new().write(b"\n> ").build();

        session
            .run(&agent, input, &mut output)
            .await
            .expect("clean exit");
        assert!(agent.calls().is_empty());
    }
}
