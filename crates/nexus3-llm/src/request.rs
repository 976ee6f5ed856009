//! The provider-agnostic completion request shape, built directly atop
//! `nexus3_core`'s message/tool types rather than a parallel wire format —
//! the wire-format-specific translation is each adapter's own problem.

use nexus3_core::{Message, ToolDefinition};

#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub system: Option<String>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: None,
            max_tokens: 4096,
            temperature: None,
            system: None,
        }
    }
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }
}
