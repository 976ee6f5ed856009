//! Compaction Engine (§4.8): summarize older history to stay under budget.

use futures::StreamExt;
use nexus3_core::{CancelToken, Message, Role, StreamEvent};
use nexus3_llm::{LlmError, LlmProvider, LlmRequest};

use crate::manager::ContextManager;
use crate::redact::redact;
use crate::tokens::TokenCounter;

const DEFAULT_TRIGGER_THRESHOLD: f64 = 0.9;
const DEFAULT_RECENT_PRESERVE_RATIO: f64 = 0.25;
const DEFAULT_SUMMARY_BUDGET_RATIO: f64 = 0.25;

#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    #[error("summarization failed: {0}")]
    Provider(#[from] LlmError),
    #[error("cancelled")]
    Cancelled,
}

pub struct CompactionResult {
    pub summary_message: Message,
    pub preserved_messages: Vec<Message>,
    pub original_tokens: u64,
    pub new_tokens: u64,
}

pub struct CompactionConfig {
    pub trigger_threshold: f64,
    pub recent_preserve_ratio: f64,
    pub summary_budget_ratio: f64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: DEFAULT_TRIGGER_THRESHOLD,
            recent_preserve_ratio: DEFAULT_RECENT_PRESERVE_RATIO,
            summary_budget_ratio: DEFAULT_SUMMARY_BUDGET_RATIO,
        }
    }
}

/// True when `manager`'s usage has crossed the compaction trigger.
pub fn should_compact(manager: &ContextManager, config: &CompactionConfig) -> bool {
    let usage = manager.token_usage();
    usage.total as f64 >= config.trigger_threshold * usage.available as f64
}

fn group_messages(messages: &[Message]) -> Vec<Vec<Message>> {
    let mut groups: Vec<Vec<Message>> = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        if msg.has_tool_calls() {
            let expected = msg.tool_calls.as_ref().map(|v| v.len()).unwrap_or(0);
            let mut group = vec![msg.clone()];
            let mut j = i + 1;
            let mut seen = 0;
            while j < messages.len() && seen < expected && messages[j].role == Role::Tool {
                group.push(messages[j].clone());
                seen += 1;
                j += 1;
            }
            groups.push(group);
            i = j;
        } else {
            groups.push(vec![msg.clone()]);
            i += 1;
        }
    }
    groups
}

/// Walks from the tail backward, keeping whole groups in `to_preserve` until
/// it would exceed `recent_preserve_ratio * available`.
fn partition(
    messages: &[Message],
    counter: &dyn TokenCounter,
    available: u64,
    recent_preserve_ratio: f64,
) -> (Vec<Message>, Vec<Message>) {
    let groups = group_messages(messages);
    let preserve_budget = (available as f64 * recent_preserve_ratio) as u64;
    let mut preserved: Vec<Vec<Message>> = Vec::new();
    let mut used = 0u64;
    for group in groups.iter().rev() {
        let cost = counter.count_messages(group);
        if used + cost > preserve_budget && !preserved.is_empty() {
            break;
        }
        used += cost;
        preserved.push(group.clone());
    }
    preserved.reverse();
    let preserved_count = preserved.len();
    let to_summarize: Vec<Message> = groups[..groups.len() - preserved_count]
        .iter()
        .flatten()
        .cloned()
        .collect();
    let to_preserve: Vec<Message> = preserved.into_iter().flatten().collect();
    (to_summarize, to_preserve)
}

fn redact_messages(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| {
            let mut redacted = m.clone();
            redacted.content = redact(&m.content);
            if let Some(calls) = &mut redacted.tool_calls {
                for call in calls {
                    call.arguments = crate::redact::redact_value(&call.arguments);
                }
            }
            redacted
        })
        .collect()
}

fn build_summarization_prompt(to_summarize: &[Message]) -> String {
    let mut transcript = String::new();
    for m in to_summarize {
        transcript.push_str(&format!("[{:?}] {}\n", m.role, m.content));
    }
    format!(
        "Summarize the following conversation history for continued use as \
         context. Retain: decisions made, files created or modified and why, \
         current task state and next steps, constraints, and any errors along \
         with how they were resolved. Be concise.\n\n{transcript}"
    )
}

/// Runs the compaction algorithm: partition, redact, summarize via
/// `provider`, and wrap the result for `ContextManager::apply_compaction`.
/// Leaves `manager` untouched on failure.
pub async fn compact(
    manager: &ContextManager,
    provider: &dyn LlmProvider,
    model: &str,
    cancel: Option<CancelToken>,
) -> Result<CompactionResult, CompactionError> {
    let usage = manager.token_usage();
    let (to_summarize, to_preserve) = partition(
        manager.messages(),
        manager.counter(),
        usage.available,
        DEFAULT_RECENT_PRESERVE_RATIO,
    );
    let redacted = redact_messages(&to_summarize);
    let prompt = build_summarization_prompt(&redacted);
    let summary_budget = (usage.available as f64 * DEFAULT_SUMMARY_BUDGET_RATIO) as u32;

    let request = LlmRequest {
        model: model.to_string(),
        messages: vec![Message::user(prompt)],
        tools: None,
        max_tokens: summary_budget.max(1),
        temperature: None,
        system: None,
    };

    let mut stream = provider.complete_stream(request, cancel.clone()).await?;
    let mut summary_text = String::new();
    while let Some(event) = stream.next().await {
        if let Some(c) = &cancel {
            if c.cancelled() {
                return Err(CompactionError::Cancelled);
            }
        }
        match event? {
            StreamEvent::ContentDelta(chunk) => summary_text.push_str(&chunk),
            StreamEvent::StreamComplete(_) => break,
            _ => {}
        }
    }

    let timestamp = chrono::Utc::now().to_rfc3339();
    let summary_content = format!(
        "[CONTEXT SUMMARY as of {timestamp} — this represents established context from earlier in the conversation]\n\n{summary_text}"
    );
    let summary_message = Message::user(summary_content);

    let original_tokens = manager.counter().count_messages(manager.messages());
    let mut new_messages = vec![summary_message.clone()];
    new_messages.extend(to_preserve.iter().cloned());
    let new_tokens = manager.counter().count_messages(&new_messages);

    Ok(CompactionResult {
        summary_message,
        preserved_messages: to_preserve,
        original_tokens,
        new_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::FallbackTokenCounter;
    use nexus3_llm::MockProvider;

    fn manager_with(messages: Vec<Message>, max_tokens: u64) -> ContextManager {
        let mut m = ContextManager::new(Box::new(FallbackTokenCounter), max_tokens, 0);
        for msg in messages {
            match msg.role {
                Role::User => m.add_user(msg.content, None),
                Role::Assistant => m.add_assistant(msg.content, msg.tool_calls),
                _ => {}
            }
        }
        m
    }

    #[test]
    fn should_compact_triggers_past_threshold() {
        let m = manager_with(vec![Message::user("x".repeat(4000))], 100);
        let config = CompactionConfig::default();
        assert!(should_compact(&m, &config));
    }

    #[test]
    fn partition_never_splits_atomic_group() {
        let call = nexus3_core::ToolCall {
            id: "t1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({}),
        };
        let messages = vec![
            Message::user("hi"),
            Message::assistant("", Some(vec![call])),
            Message::tool_result("t1", "contents"),
        ];
        let counter = FallbackTokenCounter;
        let (_, preserved) = partition(&messages, &counter, 1000, 0.9);
        let has_assistant = preserved.iter().any(|m| m.has_tool_calls());
        let has_tool_result = preserved.iter().any(|m| m.role == Role::Tool);
        assert_eq!(has_assistant, has_tool_result);
    }

    #[tokio::test]
    async fn compact_wraps_summary_with_marker() {
        let m = manager_with(
            vec![
                Message::user("tell me about rust"),
                Message::assistant("rust is great", None),
            ],
            2000,
        );
        let provider = MockProvider::new(vec![nexus3_llm::MockTurn::Text(
            "discussed rust's strengths".to_string(),
        )]);
        let result = compact(&m, &provider, "mock-1", None).await.unwrap();
        assert!(result.summary_message.content.starts_with("[CONTEXT SUMMARY"));
    }
}
