//! Chat client with tool rounds
//!
//! One `ChatClient` per session. The client owns the conversation history
//! (system prompt installed once at construction) and all history mutation
//! happens from the single task driving a turn, which holds the history
//! lock for the turn's full duration.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use confab_core::ResponseGenerator;
use confab_tools::{ToolError, ToolRegistry};

use crate::accumulate::ToolCallAccumulator;
use crate::sse::SseDecoder;
use crate::types::{ChatMessage, ChatRequest, StreamChunk, ToolCallPayload};
use crate::LlmError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

/// Chat endpoint configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (no trailing `/chat/completions`)
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Streaming chat client
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: LlmConfig,
    tools: Arc<ToolRegistry>,
    history: Mutex<Vec<ChatMessage>>,
}

/// How one streamed round ended
enum RoundOutcome {
    /// Stream finished with no tool calls
    Complete { content: String },
    /// Caller dropped the fragment receiver mid-stream
    Cancelled { content: String },
    /// Stream finished requesting tool execution
    ToolCalls {
        content: String,
        calls: Vec<ToolCallPayload>,
    },
}

impl ChatClient {
    pub fn new(
        config: LlmConfig,
        tools: Arc<ToolRegistry>,
        system_prompt: &str,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        tracing::info!(model = %config.model, endpoint = %config.base_url, "chat client initialized");

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                tools,
                history: Mutex::new(vec![ChatMessage::system(system_prompt)]),
            }),
        })
    }

    /// Snapshot of the conversation history. Blocks while a turn is running.
    pub async fn history_snapshot(&self) -> Vec<ChatMessage> {
        self.inner.history.lock().await.clone()
    }
}

impl ResponseGenerator for ChatClient {
    fn generate(&self, text: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let inner = self.inner.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            inner.run_turn(text, tx).await;
        });
        rx
    }
}

impl ClientInner {
    async fn run_turn(&self, text: String, tx: mpsc::Sender<String>) {
        let mut history = self.history.lock().await;
        history.push(ChatMessage::user(text));

        // Round loop: tool outputs are fed back until the model answers in
        // plain content.
        loop {
            match self.stream_round(&history, &tx).await {
                Ok(RoundOutcome::Complete { content }) => {
                    if !content.is_empty() {
                        history.push(ChatMessage::assistant(content));
                    }
                    break;
                }
                Ok(RoundOutcome::Cancelled { content }) => {
                    tracing::debug!("generation cancelled by caller");
                    if !content.is_empty() {
                        history.push(ChatMessage::assistant(content));
                    }
                    break;
                }
                Ok(RoundOutcome::ToolCalls { content, calls }) => {
                    tracing::info!(count = calls.len(), "executing tool calls");
                    history.push(ChatMessage::assistant_with_tools(content, calls.clone()));
                    for call in &calls {
                        let output = self.run_tool(call).await;
                        tracing::debug!(tool = %call.function.name, output = %output, "tool finished");
                        history.push(ChatMessage::tool(output, call.id.clone()));
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "chat stream failed");
                    let _ = tx
                        .send(format!(" I'm sorry, I encountered an error: {e}"))
                        .await;
                    break;
                }
            }
        }
    }

    async fn stream_round(
        &self,
        history: &[ChatMessage],
        tx: &mpsc::Sender<String>,
    ) -> Result<RoundOutcome, LlmError> {
        let schemas = self.tools.schemas();
        let request = ChatRequest {
            model: &self.config.model,
            messages: history,
            stream: true,
            tools: (!schemas.is_empty()).then_some(schemas.as_slice()),
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut full_content = String::new();
        let mut tool_calls = ToolCallAccumulator::new();

        'read: loop {
            let chunk = tokio::select! {
                // Receiver gone means the turn was cancelled; abandon the
                // upstream read so the connection closes promptly.
                _ = tx.closed() => {
                    return Ok(RoundOutcome::Cancelled { content: full_content });
                }
                chunk = stream.next() => chunk,
            };

            let Some(chunk) = chunk else { break };
            let chunk = chunk?;

            for payload in decoder.push(&chunk) {
                if payload == "[DONE]" {
                    break 'read;
                }
                let parsed: StreamChunk = match serde_json::from_str(&payload) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unparseable stream payload");
                        continue;
                    }
                };
                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            full_content.push_str(&content);
                            if tx.send(content).await.is_err() {
                                return Ok(RoundOutcome::Cancelled {
                                    content: full_content,
                                });
                            }
                        }
                    }
                    for delta in choice.delta.tool_calls.unwrap_or_default() {
                        tool_calls.push(delta);
                    }
                }
            }
        }

        if tool_calls.is_empty() {
            Ok(RoundOutcome::Complete {
                content: full_content,
            })
        } else {
            Ok(RoundOutcome::ToolCalls {
                content: full_content,
                calls: tool_calls.finish(),
            })
        }
    }

    /// Execute one tool call. Failures become error text for the model; the
    /// round loop always continues.
    async fn run_tool(&self, call: &ToolCallPayload) -> String {
        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(raw)
        };

        match arguments {
            Err(e) => format!("Error executing tool: invalid arguments: {e}"),
            Ok(arguments) => match self.tools.execute(&call.function.name, arguments).await {
                Ok(result) => serde_json::to_string(&result)
                    .unwrap_or_else(|e| format!("Error executing tool: {e}")),
                Err(ToolError::NotFound(_)) => "Error: Tool not found".to_string(),
                Err(e) => format!("Error executing tool: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    enum Scripted {
        /// SSE payloads, then `[DONE]`, then close
        Events(Vec<String>),
        /// SSE payloads, then keep the socket open forever
        EventsThenHang(Vec<String>),
        /// Plain HTTP error status
        Error(u16),
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() - (pos + 4) >= content_length {
                    return;
                }
            }
            let n = socket.read(&mut tmp).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&tmp[..n]);
        }
    }

    async fn spawn_chat_server(scripts: Vec<Scripted>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for script in scripts {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                match script {
                    Scripted::Events(events) => {
                        let mut body = String::from(
                            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                        );
                        for event in events {
                            body.push_str(&format!("data: {event}\n\n"));
                        }
                        body.push_str("data: [DONE]\n\n");
                        socket.write_all(body.as_bytes()).await.unwrap();
                    }
                    Scripted::EventsThenHang(events) => {
                        let mut body = String::from(
                            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                        );
                        for event in events {
                            body.push_str(&format!("data: {event}\n\n"));
                        }
                        socket.write_all(body.as_bytes()).await.unwrap();
                        socket.flush().await.unwrap();
                        std::future::pending::<()>().await;
                    }
                    Scripted::Error(status) => {
                        let body = format!(
                            "HTTP/1.1 {status} Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                        );
                        socket.write_all(body.as_bytes()).await.unwrap();
                    }
                }
            }
        });
        format!("http://{addr}")
    }

    fn content_event(text: &str) -> String {
        serde_json::json!({"choices": [{"delta": {"content": text}}]}).to_string()
    }

    fn tool_event(index: u32, id: &str, name: &str, arguments: &str) -> String {
        serde_json::json!({"choices": [{"delta": {"tool_calls": [{
            "index": index,
            "id": id,
            "function": {"name": name, "arguments": arguments}
        }]}}]})
        .to_string()
    }

    async fn client_for(base_url: String, tools: ToolRegistry) -> ChatClient {
        ChatClient::new(
            LlmConfig {
                base_url,
                api_key: "test-key".to_string(),
                model: "test-model".to_string(),
            },
            Arc::new(tools),
            "You are a test assistant.",
        )
        .unwrap()
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut fragments = Vec::new();
        while let Some(fragment) = rx.recv().await {
            fragments.push(fragment);
        }
        fragments
    }

    #[tokio::test]
    async fn test_simple_content_stream() {
        let base = spawn_chat_server(vec![Scripted::Events(vec![
            content_event("Hi"),
            content_event(" there."),
        ])])
        .await;
        let client = client_for(base, ToolRegistry::new()).await;

        let fragments = collect(client.generate("hello")).await;
        assert_eq!(fragments, vec!["Hi", " there."]);

        let history = client.history_snapshot().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[1].role, Role::User);
        assert_eq!(history[2], ChatMessage::assistant("Hi there."));
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let base = spawn_chat_server(vec![
            Scripted::Events(vec![tool_event(0, "call_t1", "get_current_time", "")]),
            Scripted::Events(vec![content_event("It's 3:14 PM.")]),
        ])
        .await;
        let client = client_for(base, confab_tools::default_registry()).await;

        let fragments = collect(client.generate("what time is it")).await;
        assert_eq!(fragments, vec!["It's 3:14 PM."]);

        let history = client.history_snapshot().await;
        // system + user + assistant(tool_calls) + tool + assistant(content)
        assert_eq!(history.len(), 5);
        assert_eq!(history[2].role, Role::Assistant);
        let calls = history[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "get_current_time");

        assert_eq!(history[3].role, Role::Tool);
        assert_eq!(history[3].tool_call_id.as_deref(), Some("call_t1"));
        // Tool results are serialized JSON; the clock tool returns a string.
        let time: String =
            serde_json::from_str(history[3].content.as_deref().unwrap()).unwrap();
        assert!(time.ends_with("AM") || time.ends_with("PM"));

        assert_eq!(history[4], ChatMessage::assistant("It's 3:14 PM."));
    }

    #[tokio::test]
    async fn test_two_tool_calls_in_one_round() {
        let base = spawn_chat_server(vec![
            Scripted::Events(vec![
                tool_event(0, "call_a", "get_current_time", ""),
                tool_event(1, "call_b", "get_current_date", ""),
            ]),
            Scripted::Events(vec![content_event("Done.")]),
        ])
        .await;
        let client = client_for(base, confab_tools::default_registry()).await;

        let fragments = collect(client.generate("time and date please")).await;
        assert_eq!(fragments, vec!["Done."]);

        let history = client.history_snapshot().await;
        // system + user + assistant(2 tool_calls) + tool + tool + assistant
        assert_eq!(history.len(), 6);
        assert_eq!(history[2].tool_calls.as_ref().unwrap().len(), 2);
        assert_eq!(history[3].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(history[4].tool_call_id.as_deref(), Some("call_b"));
        assert_eq!(history[5].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_to_model() {
        let base = spawn_chat_server(vec![
            Scripted::Events(vec![tool_event(0, "call_x", "launch_rockets", "{}")]),
            Scripted::Events(vec![content_event("I can't do that.")]),
        ])
        .await;
        let client = client_for(base, ToolRegistry::new()).await;

        let fragments = collect(client.generate("do something")).await;
        assert_eq!(fragments, vec!["I can't do that."]);

        let history = client.history_snapshot().await;
        assert_eq!(history[3].role, Role::Tool);
        assert_eq!(history[3].content.as_deref(), Some("Error: Tool not found"));
    }

    #[tokio::test]
    async fn test_provider_error_yields_apology() {
        let base = spawn_chat_server(vec![Scripted::Error(500)]).await;
        let client = client_for(base, ToolRegistry::new()).await;

        let fragments = collect(client.generate("hello")).await;
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with(" I'm sorry, I encountered an error"));

        // No assistant message is recorded for a failed round.
        let history = client.history_snapshot().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_cancellation_preserves_partial_content() {
        let base = spawn_chat_server(vec![Scripted::EventsThenHang(vec![content_event(
            "Partial",
        )])])
        .await;
        let client = client_for(base, ToolRegistry::new()).await;

        let mut rx = client.generate("hello");
        assert_eq!(rx.recv().await.as_deref(), Some("Partial"));
        drop(rx);

        // The producer notices the dropped receiver, records the partial
        // assistant message and releases the history lock.
        let history = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let history = client.history_snapshot().await;
                if history.len() == 3 {
                    return history;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("partial assistant message never recorded");

        assert_eq!(history[2], ChatMessage::assistant("Partial"));
    }

    #[tokio::test]
    async fn test_empty_stream_records_no_assistant() {
        let base = spawn_chat_server(vec![Scripted::Events(vec![])]).await;
        let client = client_for(base, ToolRegistry::new()).await;

        let fragments = collect(client.generate("hello")).await;
        assert!(fragments.is_empty());

        let history = client.history_snapshot().await;
        assert_eq!(history.len(), 2);
    }
}
