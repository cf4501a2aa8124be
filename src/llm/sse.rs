//! Server-sent event decoding for streamed chat completions.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::{LlmError, StreamEvent};

enum Line {
    Data(String),
    Done,
}

/// Split an SSE byte stream into its `data:` payloads.
///
/// Lines are reassembled across chunk boundaries. Comments, `event:`/`id:`
/// fields and blank separators are skipped; `data: [DONE]` ends the stream.
///
/// Each `data:` line is yielded as a complete payload. Chat-completion
/// chunks are single-line JSON, so multi-line `data:` events are not
/// joined.
pub fn data_payloads<S>(inner: S) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    futures::stream::unfold(
        (Box::pin(inner), Vec::<u8>::new(), false),
        |(mut stream, mut buf, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line = buf.drain(..=pos).collect::<Vec<u8>>();
                    match classify_line(&line) {
                        Some(Line::Data(data)) => return Some((Ok(data), (stream, buf, false))),
                        Some(Line::Done) => return None,
                        None => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(LlmError::Http(e)), (stream, buf, true))),
                    None => {
                        // Stream ended without a trailing newline
                        let remaining = std::mem::take(&mut buf);
                        return match classify_line(&remaining) {
                            Some(Line::Data(data)) => Some((Ok(data), (stream, buf, true))),
                            _ => None,
                        };
                    }
                }
            }
        },
    )
}

fn classify_line(line: &[u8]) -> Option<Line> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);
    let data = text.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == "[DONE]" {
        return Some(Line::Done);
    }
    if data.trim().is_empty() {
        return None;
    }
    Some(Line::Data(data.to_string()))
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Deserialize)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Decode one `data:` payload into stream events.
///
/// Chunks without choices (Azure's prompt-filter preamble, usage trailers)
/// decode to no events.
pub fn parse_chunk(data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let chunk: Chunk =
        serde_json::from_str(data).map_err(|e| LlmError::Decode(format!("{}: {}", e, data)))?;

    if let Some(error) = chunk.error {
        return Err(LlmError::Provider(error.message));
    }

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::TextDelta(content));
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                events.push(StreamEvent::ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                });
            }
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finished { reason });
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(
        parts: &[&'static str],
    ) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        let parts: Vec<Result<Bytes, reqwest::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        futures::stream::iter(parts)
    }

    async fn collect(parts: &[&'static str]) -> Vec<String> {
        data_payloads(byte_stream(parts))
            .map(|item| item.expect("payload"))
            .collect()
            .await
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let payloads = collect(&["data: {\"a\"", ":1}\n\ndata: {\"b\":2}\n", "\n"]).await;
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn skips_comments_and_stops_at_done() {
        let payloads = collect(&[
            ": keep-alive\r\n",
            "event: message\r\ndata: one\r\n\r\n",
            "data: [DONE]\n\n",
            "data: after-done\n",
        ])
        .await;
        assert_eq!(payloads, vec!["one"]);
    }

    #[tokio::test]
    async fn flushes_final_line_without_newline() {
        let payloads = collect(&["data: tail"]).await;
        assert_eq!(payloads, vec!["tail"]);
    }

    #[test]
    fn parses_text_and_finish() {
        let events = parse_chunk(
            r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(events, vec![StreamEvent::TextDelta("Hel".to_string())]);

        let events = parse_chunk(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Finished {
                reason: "stop".to_string()
            }]
        );
    }

    #[test]
    fn parses_tool_call_fragments() {
        let events = parse_chunk(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_user_profile","arguments":""}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolCallDelta {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("get_user_profile".to_string()),
                arguments: String::new(),
            }]
        );
    }

    #[test]
    fn prompt_filter_preamble_yields_nothing() {
        let events = parse_chunk(
            r#"{"choices":[],"prompt_filter_results":[{"prompt_index":0,"content_filter_results":{}}]}"#,
        )
        .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn error_payloads_and_garbage_are_errors() {
        assert!(matches!(
            parse_chunk(r#"{"error":{"message":"content filtered"}}"#),
            Err(LlmError::Provider(ref m)) if m == "content filtered"
        ));
        assert!(matches!(parse_chunk("not json"), Err(LlmError::Decode(_))));
    }
}
