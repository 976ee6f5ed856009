//! Turn Executor (§4.9): drives one user turn through the provider/tool loop.
//!
//! ```text
//! IDLE → WAITING (request recorded, cancel token bound)
//! WAITING → STREAMING (first stream event received)
//! STREAMING → TOOL_BATCH (assistant message has tool_calls) | DONE (otherwise)
//! TOOL_BATCH → STREAMING (all tool results appended; loop to provider)
//! any → CANCELLED (cancel token raised)
//! any → FAILED (unrecoverable error)
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use nexus3_core::{CancelToken, Message, StreamEvent, ToolResult as CoreToolResult};
use nexus3_context::{compact, should_compact, CompactionConfig, ContextManager};
use nexus3_llm::{LlmProvider, LlmRequest};
use nexus3_permissions::{Action, AgentPermissions};
use nexus3_skills::ToolRegistry;

use crate::confirm::ConfirmationCallback;
use crate::events::{EventSink, TurnEvent};

#[derive(Clone, Debug)]
pub struct TurnConfig {
    pub model: String,
    pub max_tokens: u32,
    pub max_tool_iterations: usize,
    pub default_tool_timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            max_tool_iterations: 25,
            default_tool_timeout: Duration::from_secs(120),
        }
    }
}

/// Outcome of `run_turn`. `Failed` carries a message rather than
/// `nexus3_core::Error` directly so it can be handed straight to an RPC
/// response without the caller re-deriving a user-facing string.
#[derive(Clone, Debug)]
pub enum TurnOutcome {
    Completed { content: String },
    Cancelled { partial_content: String },
    Failed { message: String },
}

pub struct TurnExecutor {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    confirm: Arc<dyn ConfirmationCallback>,
    events: Arc<dyn EventSink>,
    config: TurnConfig,
    compaction: CompactionConfig,
}

impl TurnExecutor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        confirm: Arc<dyn ConfirmationCallback>,
        events: Arc<dyn EventSink>,
        config: TurnConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            confirm,
            events,
            config,
            compaction: CompactionConfig::default(),
        }
    }

    /// Runs one user turn to completion, cancellation, or failure. `context`
    /// and `permissions` are mutated in place; the caller owns their lifetime
    /// across turns.
    pub async fn run_turn(
        &self,
        context: &mut ContextManager,
        cwd: &Path,
        permissions: &mut AgentPermissions,
        user_message: &str,
        request_id: &str,
        cancel: CancelToken,
    ) -> TurnOutcome {
        context.add_user(user_message, None);

        if should_compact(context, &self.compaction) {
            match compact(context, self.provider.as_ref(), &self.config.model, Some(cancel.clone())).await {
                Ok(result) => {
                    context.apply_compaction(result.summary_message, result.preserved_messages, None);
                }
                Err(e) => {
                    return TurnOutcome::Failed {
                        message: format!("compaction failed: {e}"),
                    };
                }
            }
        }

        self.events.publish(TurnEvent::TurnStarted {
            request_id: request_id.to_string(),
        });

        let mut iterations = 0usize;

        loop {
            if cancel.cancelled() {
                self.events.publish(TurnEvent::TurnCancelled {
                    request_id: request_id.to_string(),
                });
                return TurnOutcome::Cancelled {
                    partial_content: String::new(),
                };
            }

            iterations += 1;
            if iterations > self.config.max_tool_iterations {
                return TurnOutcome::Failed {
                    message: "max tool iterations exceeded".to_string(),
                };
            }

            let messages = context.build_messages();
            let tool_defs = self.registry.get_definitions(permissions);
            context.set_tool_definitions(tool_defs.clone());

            let request = LlmRequest {
                model: self.config.model.clone(),
                messages,
                tools: if tool_defs.is_empty() { None } else { Some(tool_defs) },
                max_tokens: self.config.max_tokens,
                temperature: None,
                system: context.rendered_system_prompt(),
            };

            let stream = match self.provider.complete_stream(request, Some(cancel.clone())).await {
                Ok(s) => s,
                Err(e) => {
                    return TurnOutcome::Failed {
                        message: e.to_string(),
                    };
                }
            };

            let (assistant_message, partial_text, cancelled) =
                self.drain_stream(stream, request_id, &cancel).await;

            if cancelled {
                if let Some(text) = partial_text {
                    context.add_assistant(text, None);
                }
                self.events.publish(TurnEvent::TurnCancelled {
                    request_id: request_id.to_string(),
                });
                return TurnOutcome::Cancelled {
                    partial_content: partial_text_or_empty(&assistant_message),
                };
            }

            let assistant_message = match assistant_message {
                Some(m) => m,
                None => {
                    return TurnOutcome::Failed {
                        message: "provider stream ended without completing".to_string(),
                    };
                }
            };

            context.add_assistant(assistant_message.content.clone(), assistant_message.tool_calls.clone());

            if !assistant_message.has_tool_calls() {
                self.events.publish(TurnEvent::TurnCompleted {
                    request_id: request_id.to_string(),
                    content: assistant_message.content.clone(),
                });
                return TurnOutcome::Completed {
                    content: assistant_message.content,
                };
            }

            let tool_calls = assistant_message.tool_calls.unwrap_or_default();
            let tool_names: Vec<String> = tool_calls.iter().map(|tc| tc.name.clone()).collect();
            self.events.publish(TurnEvent::BatchStarted {
                request_id: request_id.to_string(),
                tools: tool_names,
            });

            let mut halted = false;
            for tc in &tool_calls {
                if cancel.cancelled() {
                    context.add_tool_result(&CoreToolResult::cancelled(tc.id.as_str(), tc.name.as_str()));
                    continue;
                }

                if halted {
                    context.add_tool_result(&CoreToolResult::halted(tc.id.as_str(), tc.name.as_str()));
                    continue;
                }

                let action = action_for_tool(&tc.name);
                if let Some(action) = action {
                    let subject = subject_for_call(&tc.arguments);
                    if permissions.requires_confirmation(action, Path::new(&subject)) {
                        let decision = self.confirm.ask(action, &subject).await;
                        permissions
                            .allowances
                            .record(action, decision, Some(Path::new(&subject)));
                        if decision == nexus3_permissions::ConfirmDecision::Deny {
                            let result = CoreToolResult::error(
                                tc.id.as_str(),
                                tc.name.as_str(),
                                "permission denied: confirmation declined",
                            );
                            self.events.publish(TurnEvent::ToolCompleted {
                                request_id: request_id.to_string(),
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                status: result.status,
                            });
                            context.add_tool_result(&result);
                            halted = true;
                            continue;
                        }
                    }
                }

                self.events.publish(TurnEvent::ToolStarted {
                    request_id: request_id.to_string(),
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                });

                let result = run_tool_with_timeout(
                    &self.registry,
                    &tc.name,
                    &tc.id,
                    tc.arguments.clone(),
                    cwd,
                    permissions,
                    cancel.child_token(),
                    self.config.default_tool_timeout,
                )
                .await;

                self.events.publish(TurnEvent::ToolCompleted {
                    request_id: request_id.to_string(),
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    status: result.status,
                });

                if result.is_error() {
                    halted = true;
                }
                context.add_tool_result(&result);
            }

            if halted {
                self.events.publish(TurnEvent::BatchHalted {
                    request_id: request_id.to_string(),
                    at: "tool batch".to_string(),
                });
            }
            self.events.publish(TurnEvent::BatchCompleted {
                request_id: request_id.to_string(),
            });
        }
    }

    /// Consumes the provider stream, emitting chunk/reasoning/tool-detected
    /// events. Returns the completed assistant message (if the provider
    /// reached `StreamComplete`), any partial text captured so far, and
    /// whether cancellation interrupted the stream.
    async fn drain_stream(
        &self,
        stream: nexus3_llm::LlmStream,
        request_id: &str,
        cancel: &CancelToken,
    ) -> (Option<Message>, Option<String>, bool) {
        tokio::pin!(stream);
        let mut text = String::new();
        let mut reasoning_open = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled_fut() => {
                    if reasoning_open {
                        self.events.publish(TurnEvent::ReasoningEnded { request_id: request_id.to_string() });
                    }
                    return (None, Some(text), true);
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(StreamEvent::ContentDelta(delta))) => {
                            text.push_str(&delta);
                            self.events.publish(TurnEvent::ContentChunk {
                                request_id: request_id.to_string(),
                                delta,
                            });
                        }
                        Some(Ok(StreamEvent::ReasoningDelta(_))) => {
                            if !reasoning_open {
                                reasoning_open = true;
                                self.events.publish(TurnEvent::ReasoningStarted { request_id: request_id.to_string() });
                            }
                        }
                        Some(Ok(StreamEvent::ToolCallStarted { id, name, .. })) => {
                            self.events.publish(TurnEvent::ToolDetected {
                                request_id: request_id.to_string(),
                                id,
                                name,
                            });
                        }
                        Some(Ok(StreamEvent::ToolCallArguments { .. })) => {}
                        Some(Ok(StreamEvent::StreamComplete(message))) => {
                            if reasoning_open {
                                self.events.publish(TurnEvent::ReasoningEnded { request_id: request_id.to_string() });
                            }
                            return (Some(*message), Some(text), false);
                        }
                        Some(Err(_)) | None => {
                            if reasoning_open {
                                self.events.publish(TurnEvent::ReasoningEnded { request_id: request_id.to_string() });
                            }
                            return (None, Some(text), false);
                        }
                    }
                }
            }
        }
    }
}

fn partial_text_or_empty(message: &Option<Message>) -> String {
    message.as_ref().map(|m| m.content.clone()).unwrap_or_default()
}

/// Which confirmable action class a tool belongs to, if any. Read-only tools
/// (`read_file`, `glob`, `grep`) never require confirmation.
fn action_for_tool(name: &str) -> Option<Action> {
    if nexus3_permissions::WRITE_CAPABLE_TOOLS.contains(&name) {
        Some(Action::Write)
    } else if name == "bash" {
        Some(Action::Exec)
    } else {
        None
    }
}

/// Best-effort extraction of the thing a confirmation prompt should name:
/// a file path argument, or the command itself for `bash`.
fn subject_for_call(arguments: &serde_json::Value) -> String {
    for key in ["file_path", "source", "destination", "path", "command"] {
        if let Some(s) = arguments.get(key).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    String::new()
}

/// Races a tool's execution against `timeout`. On expiry, cancels the tool's
/// token and then awaits the same (still-pinned) future so the tool's own
/// cancellation handling — e.g. `bash`'s process-group kill — has a chance
/// to run before we return its result.
#[allow(clippy::too_many_arguments)]
async fn run_tool_with_timeout(
    registry: &ToolRegistry,
    name: &str,
    tool_call_id: &str,
    arguments: serde_json::Value,
    cwd: &Path,
    permissions: &AgentPermissions,
    cancel: CancelToken,
    timeout: Duration,
) -> CoreToolResult {
    let exec = registry.execute(name, tool_call_id, arguments, cwd, permissions, cancel.clone());
    tokio::pin!(exec);

    tokio::select! {
        result = &mut exec => result,
        _ = tokio::time::sleep(timeout) => {
            cancel.cancel();
            let mut result = exec.await;
            result.status = nexus3_core::ToolStatus::Error;
            result.error = Some("timeout".to_string());
            result.content = "timeout".to_string();
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AllowAll;
    use crate::events::RecordingSink;
    use nexus3_context::FallbackTokenCounter;
    use nexus3_llm::{MockProvider, MockTurn};
    use nexus3_permissions::resolve_preset;

    fn executor(provider: MockProvider) -> TurnExecutor {
        TurnExecutor::new(
            Arc::new(provider),
            Arc::new(nexus3_skills::create_default_registry()),
            Arc::new(AllowAll),
            Arc::new(RecordingSink::new()),
            TurnConfig {
                model: "mock-1".to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn text_only_turn_completes() {
        let executor = executor(MockProvider::new(vec![MockTurn::Text("hi there".to_string())]));
        let mut context = ContextManager::new(Box::new(FallbackTokenCounter), 100_000, 0);
        let dir = std::env::temp_dir();
        let mut permissions = resolve_preset("yolo", &dir).unwrap();
        let outcome = executor
            .run_turn(&mut context, &dir, &mut permissions, "hello", "r1", CancelToken::new())
            .await;
        match outcome {
            TurnOutcome::Completed { content } => assert_eq!(content, "hi there"),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_cancelled_token_yields_cancelled_outcome() {
        let executor = executor(MockProvider::echo());
        let mut context = ContextManager::new(Box::new(FallbackTokenCounter), 100_000, 0);
        let dir = std::env::temp_dir();
        let mut permissions = resolve_preset("yolo", &dir).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = executor
            .run_turn(&mut context, &dir, &mut permissions, "hello", "r1", cancel)
            .await;
        assert!(matches!(outcome, TurnOutcome::Cancelled { .. }));
    }

    #[tokio::test]
    async fn tool_call_turn_appends_paired_result() {
        let executor = executor(MockProvider::new(vec![
            MockTurn::ToolCall {
                id: "t1".to_string(),
                name: "read_file".to_string(),
                arguments: serde_json::json!({"file_path": "missing.txt"}),
            },
            MockTurn::Text("done".to_string()),
        ]));
        let mut context = ContextManager::new(Box::new(FallbackTokenCounter), 100_000, 0);
        let dir = std::env::temp_dir();
        let mut permissions = resolve_preset("yolo", &dir).unwrap();
        let outcome = executor
            .run_turn(&mut context, &dir, &mut permissions, "read a file", "r1", CancelToken::new())
            .await;
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        let messages = context.messages();
        let tool_msg = messages.iter().find(|m| m.tool_call_id.as_deref() == Some("t1"));
        assert!(tool_msg.is_some());
    }
}
