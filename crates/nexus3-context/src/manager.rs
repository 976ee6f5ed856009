//! Context Manager (§4.7): the message history a turn actually sends to the
//! provider, with token accounting and group-aware truncation.

use nexus3_core::{Message, Role, ToolDefinition, ToolResult};

use crate::tokens::TokenCounter;

const ENVIRONMENT_MARKER: &str = "## Environment";

#[derive(Clone, Copy, Debug)]
pub enum TruncationStrategy {
    OldestFirst,
    MiddleOut,
}

impl Default for TruncationStrategy {
    fn default() -> Self {
        Self::OldestFirst
    }
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct TokenUsage {
    pub system: u64,
    pub tools: u64,
    pub messages: u64,
    pub total: u64,
    pub budget: u64,
    pub available: u64,
    pub remaining: i64,
}

pub struct ContextManager {
    system_prompt: Option<String>,
    tool_definitions: Vec<ToolDefinition>,
    messages: Vec<Message>,
    counter: Box<dyn TokenCounter>,
    max_tokens: u64,
    reserve_tokens: u64,
    pub truncation_strategy: TruncationStrategy,
}

impl ContextManager {
    pub fn new(counter: Box<dyn TokenCounter>, max_tokens: u64, reserve_tokens: u64) -> Self {
        Self {
            system_prompt: None,
            tool_definitions: Vec::new(),
            messages: Vec::new(),
            counter,
            max_tokens,
            reserve_tokens,
            truncation_strategy: TruncationStrategy::default(),
        }
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    pub fn set_tool_definitions(&mut self, defs: Vec<ToolDefinition>) {
        self.tool_definitions = defs;
    }

    pub fn add_user(&mut self, content: impl Into<String>, meta: Option<serde_json::Map<String, serde_json::Value>>) {
        let msg = match meta {
            Some(m) => Message::user_with_meta(content, m),
            None => Message::user(content),
        };
        self.messages.push(msg);
    }

    pub fn add_assistant(&mut self, content: impl Into<String>, tool_calls: Option<Vec<nexus3_core::ToolCall>>) {
        self.messages.push(Message::assistant(content, tool_calls));
    }

    pub fn add_tool_result(&mut self, result: &ToolResult) {
        self.messages.push(result.to_message());
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tool_definitions
    }

    fn tools_tokens(&self) -> u64 {
        self.tool_definitions
            .iter()
            .map(|t| {
                self.counter.count(&t.name)
                    + self.counter.count(&t.description)
                    + self.counter.count(&t.input_schema.to_string())
            })
            .sum()
    }

    pub fn token_usage(&self) -> TokenUsage {
        let system = self
            .system_prompt
            .as_deref()
            .map(|s| self.counter.count(s))
            .unwrap_or(0);
        let tools = self.tools_tokens();
        let messages = self.counter.count_messages(&self.messages);
        let total = system + tools + messages;
        let available = self.max_tokens.saturating_sub(self.reserve_tokens);
        TokenUsage {
            system,
            tools,
            messages,
            total,
            budget: self.max_tokens,
            available,
            remaining: available as i64 - total as i64,
        }
    }

    pub fn is_over_budget(&self) -> bool {
        let usage = self.token_usage();
        usage.total > usage.available
    }

    /// The system prompt with the current UTC time injected at its
    /// environment marker, if one is present. Sent to the provider
    /// separately from `build_messages`'s history list.
    pub fn rendered_system_prompt(&self) -> Option<String> {
        self.system_prompt.as_ref().map(|s| inject_environment(s))
    }

    /// Returns the messages to send to the provider, truncating (and
    /// persisting the truncation into `self.messages`) if over budget.
    pub fn build_messages(&mut self) -> Vec<Message> {
        let usage = self.token_usage();
        if usage.total <= usage.available {
            return self.messages.clone();
        }
        let budget_for_messages = usage
            .available
            .saturating_sub(usage.system)
            .saturating_sub(usage.tools);
        let groups = group_messages(&self.messages);
        let kept = match self.truncation_strategy {
            TruncationStrategy::OldestFirst => truncate_oldest_first(&groups, &*self.counter, budget_for_messages),
            TruncationStrategy::MiddleOut => truncate_middle_out(&groups, &*self.counter, budget_for_messages),
        };
        let flattened: Vec<Message> = kept.into_iter().flatten().collect();
        self.messages = flattened.clone();
        flattened
    }

    /// Replaces all messages with `[summary_message, ...preserved_messages]`,
    /// optionally reloading the system prompt.
    pub fn apply_compaction(
        &mut self,
        summary_message: Message,
        preserved_messages: Vec<Message>,
        new_system_prompt: Option<String>,
    ) {
        let mut messages = vec![summary_message];
        messages.extend(preserved_messages);
        self.messages = messages;
        if let Some(prompt) = new_system_prompt {
            self.system_prompt = Some(prompt);
        }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        &*self.counter
    }
}

fn inject_environment(system_prompt: &str) -> String {
    let now = chrono::Utc::now().to_rfc3339();
    if let Some(idx) = system_prompt.find(ENVIRONMENT_MARKER) {
        let insert_at = idx + ENVIRONMENT_MARKER.len();
        let mut out = String::with_capacity(system_prompt.len() + 64);
        out.push_str(&system_prompt[..insert_at]);
        out.push_str(&format!("\nCurrent time (UTC): {now}"));
        out.push_str(&system_prompt[insert_at..]);
        out
    } else {
        system_prompt.to_string()
    }
}

/// Groups messages so an assistant-with-tool-calls message and its tool
/// results are never split by truncation.
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

fn group_tokens(group: &[Message], counter: &dyn TokenCounter) -> u64 {
    counter.count_messages(group)
}

fn truncate_oldest_first(
    groups: &[Vec<Message>],
    counter: &dyn TokenCounter,
    budget: u64,
) -> Vec<Vec<Message>> {
    if groups.is_empty() {
        return Vec::new();
    }
    let total: u64 = groups.iter().map(|g| group_tokens(g, counter)).sum();
    if total <= budget {
        return groups.to_vec();
    }
    let mut start = 0;
    let mut running = total;
    while start + 1 < groups.len() && running > budget {
        running -= group_tokens(&groups[start], counter);
        start += 1;
    }
    groups[start..].to_vec()
}

fn truncate_middle_out(
    groups: &[Vec<Message>],
    counter: &dyn TokenCounter,
    budget: u64,
) -> Vec<Vec<Message>> {
    if groups.len() <= 2 {
        return groups.to_vec();
    }
    let first = groups[0].clone();
    let last = groups[groups.len() - 1].clone();
    let mut used = group_tokens(&first, counter) + group_tokens(&last, counter);
    let mut middle_kept: Vec<Vec<Message>> = Vec::new();
    for group in groups[1..groups.len() - 1].iter().rev() {
        let cost = group_tokens(group, counter);
        if used + cost > budget {
            break;
        }
        used += cost;
        middle_kept.push(group.clone());
    }
    middle_kept.reverse();
    let mut result = vec![first];
    result.extend(middle_kept);
    result.push(last);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::FallbackTokenCounter;

    fn manager() -> ContextManager {
        ContextManager::new(Box::new(FallbackTokenCounter), 1000, 0)
    }

    #[test]
    fn token_usage_accounts_system_and_messages() {
        let mut m = manager();
        m.set_system_prompt("abcd");
        m.add_user("abcd");
        let usage = m.token_usage();
        assert_eq!(usage.system, 1);
        assert!(usage.messages >= 1);
    }

    #[test]
    fn environment_marker_gets_timestamp_injected() {
        let mut m = manager();
        m.set_system_prompt("intro\n## Environment\nmore text");
        let rendered = m.rendered_system_prompt().unwrap();
        assert!(rendered.contains("Current time (UTC):"));
    }

    #[test]
    fn missing_marker_leaves_prompt_untouched() {
        let mut m = manager();
        m.set_system_prompt("no marker here");
        assert_eq!(m.rendered_system_prompt().unwrap(), "no marker here");
    }

    #[test]
    fn build_messages_keeps_at_least_most_recent_group() {
        let mut m = ContextManager::new(Box::new(FallbackTokenCounter), 10, 0);
        for i in 0..20 {
            m.add_user("x".repeat(40 + i));
        }
        let built = m.build_messages();
        assert!(!built.is_empty());
        assert_eq!(built.last().unwrap().content, m.messages().last().unwrap().content);
    }

    #[test]
    fn tool_call_group_is_never_split() {
        let mut m = manager();
        let call = nexus3_core::ToolCall {
            id: "t1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({}),
        };
        m.add_assistant("", Some(vec![call]));
        m.messages.push(Message::tool_result("t1", "contents"));
        let groups = group_messages(&m.messages);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }
}
