//! A deterministic, scriptable provider for exercising the turn executor and
//! gateway without a network call. Not a stand-in for any particular vendor's
//! wire format — the spec treats completion as an abstract capability, so
//! this is the only provider implementation this crate carries.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::request::LlmRequest;
use async_stream::stream;
use nexus3_core::{CancelToken, Message, StreamEvent};

/// One scripted turn: either plain text, or a single tool call.
#[derive(Clone, Debug)]
pub enum MockTurn {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
}

/// Replays a fixed sequence of [`MockTurn`]s, one per call to
/// `complete_stream`, wrapping around once exhausted.
pub struct MockProvider {
    name: String,
    models: Vec<String>,
    script: Vec<MockTurn>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl MockProvider {
    pub fn new(script: Vec<MockTurn>) -> Self {
        Self {
            name: "mock".to_string(),
            models: vec!["mock-1".to_string()],
            script,
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn echo() -> Self {
        Self::new(vec![MockTurn::Text("ok".to_string())])
    }

    fn next_turn(&self) -> MockTurn {
        if self.script.is_empty() {
            return MockTurn::Text(String::new());
        }
        let i = self
            .cursor
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            % self.script.len();
        self.script[i].clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn complete_stream(
        &self,
        _request: LlmRequest,
        cancel: Option<CancelToken>,
    ) -> LlmResult<LlmStream> {
        if let Some(c) = &cancel {
            if c.cancelled() {
                return Err(LlmError::Cancelled);
            }
        }
        let turn = self.next_turn();
        let stream = stream! {
            match turn {
                MockTurn::Text(text) => {
                    yield Ok(StreamEvent::ContentDelta(text.clone()));
                    yield Ok(StreamEvent::StreamComplete(Box::new(Message::assistant(text, None))));
                }
                MockTurn::ToolCall { id, name, arguments } => {
                    yield Ok(StreamEvent::ToolCallStarted { index: 0, id: id.clone(), name: name.clone() });
                    yield Ok(StreamEvent::ToolCallArguments { id: id.clone(), arguments: arguments.clone() });
                    let tool_call = nexus3_core::ToolCall { id, name, arguments };
                    yield Ok(StreamEvent::StreamComplete(Box::new(Message::assistant(String::new(), Some(vec![tool_call])))));
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_yields_content_then_complete() {
        use futures::StreamExt;
        let provider = MockProvider::echo();
        let mut s = provider
            .complete_stream(LlmRequest::new("mock-1", vec![]), None)
            .await
            .unwrap();
        let first = s.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamEvent::ContentDelta(_)));
        let second = s.next().await.unwrap().unwrap();
        assert!(matches!(second, StreamEvent::StreamComplete(_)));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let provider = MockProvider::echo();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = provider
            .complete_stream(LlmRequest::new("mock-1", vec![]), Some(cancel))
            .await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }
}
