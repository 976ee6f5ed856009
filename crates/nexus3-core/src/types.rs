//! Core data model: messages, tool calls/results, agent identifiers, stream events.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Agent/session identifier — cheaply cloneable, validated on construction.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct AgentId(Arc<str>);

impl AgentId {
    /// Valid identifiers match `[A-Za-z0-9_-]+` and are at most 64 bytes long.
    pub fn parse(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() || s.len() > 64 {
            return Err(format!(
                "agent id must be 1..=64 bytes, got {} bytes",
                s.len()
            ));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(format!("agent id contains invalid characters: {s}"));
        }
        Ok(Self(Arc::from(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AgentId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        AgentId::parse(s).map_err(serde::de::Error::custom)
    }
}

/// Message role.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// An immutable conversation message. Constructed once, never mutated in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            meta: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            meta: None,
        }
    }

    pub fn user_with_meta(
        content: impl Into<String>,
        meta: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            meta: Some(meta),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            meta: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            meta: None,
        }
    }

    /// True for an assistant message carrying one or more tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// A tool call emitted by the assistant. `id` is unique within its message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of executing a single tool call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
    Halted,
    Cancelled,
}

/// Result of executing a tool call, destined to become a `tool`-role message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            status: ToolStatus::Ok,
            error: None,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: error.clone(),
            status: ToolStatus::Error,
            error: Some(error),
        }
    }

    pub fn halted(tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: String::new(),
            status: ToolStatus::Halted,
            error: Some("halted: a previous tool in this batch failed".to_string()),
        }
    }

    pub fn cancelled(tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: String::new(),
            status: ToolStatus::Cancelled,
            error: Some("cancelled".to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ToolStatus::Error | ToolStatus::Halted | ToolStatus::Cancelled)
    }

    /// Render as the content of the `tool`-role message appended to context.
    pub fn to_message(&self) -> Message {
        let content = if self.is_error() {
            self.error.clone().unwrap_or_else(|| self.content.clone())
        } else {
            self.content.clone()
        };
        Message::tool_result(self.tool_call_id.clone(), content)
    }
}

/// A tool definition as advertised to the LLM provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One item of a provider's streamed completion, emitted strictly in order.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    ContentDelta(String),
    ReasoningDelta(String),
    ToolCallStarted { index: usize, id: String, name: String },
    /// Carries the fully assembled arguments for one tool call once the
    /// provider has finished streaming them.
    ToolCallArguments { id: String, arguments: serde_json::Value },
    StreamComplete(Box<Message>),
}

/// Token usage reported by a provider alongside `StreamComplete`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_accepts_valid() {
        assert!(AgentId::parse("a1-worker_2").is_ok());
    }

    #[test]
    fn agent_id_rejects_empty_and_long() {
        assert!(AgentId::parse("").is_err());
        assert!(AgentId::parse("a".repeat(65)).is_err());
        assert!(AgentId::parse("a".repeat(64)).is_ok());
    }

    #[test]
    fn agent_id_rejects_invalid_chars() {
        assert!(AgentId::parse("has space").is_err());
        assert!(AgentId::parse("has/slash").is_err());
    }

    #[test]
    fn tool_result_halted_is_error() {
        let r = ToolResult::halted("id1", "write_file");
        assert!(r.is_error());
        assert_eq!(r.status, ToolStatus::Halted);
    }
}
