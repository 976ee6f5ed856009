//! Skill Registry (§4.6): tools are self-contained modules implementing
//! [`Tool`], registered once and looked up by name at execution time.

use nexus3_core::{CancelToken, ToolDefinition, ToolResult};
use nexus3_permissions::AgentPermissions;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// The slice of per-agent services a skill needs to run. A narrower view
/// than the agent's full service container (§4.5), which also carries the
/// logger, event hub, and clipboard that no skill touches directly.
pub struct SkillServices<'a> {
    pub permissions: &'a AgentPermissions,
    pub cwd: &'a Path,
}

/// Implement this to add a new capability. Each tool is a standalone unit
/// registered with a [`ToolRegistry`]; to add one, create a file under
/// `tools/`, implement this trait, and register it in `create_default_registry`.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "bash", "read_file").
    fn name(&self) -> &str;

    /// Human-readable description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value;

    /// Whether this tool only reads state (no side effects). Write-capable
    /// tools are enumerated explicitly in [`nexus3_permissions::WRITE_CAPABLE_TOOLS`].
    fn is_read_only(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments and services.
    async fn execute(
        &self,
        tool_call_id: &str,
        arguments: Value,
        services: &SkillServices<'_>,
    ) -> ToolResult;

    /// Execute with cooperative cancellation. Default: race `execute` against
    /// the token. Tools that manage child processes (bash) override this to
    /// kill the process group immediately on cancellation.
    async fn execute_cancellable(
        &self,
        tool_call_id: &str,
        arguments: Value,
        services: &SkillServices<'_>,
        cancel: CancelToken,
    ) -> ToolResult {
        tokio::select! {
            result = self.execute(tool_call_id, arguments, services) => result,
            _ = cancel.cancelled_fut() => ToolResult::cancelled(tool_call_id, self.name()),
        }
    }

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Idempotent by name; re-registering replaces the
    /// previous entry (last writer wins only when explicitly replacing).
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions for every tool enabled under `permissions`.
    pub fn get_definitions(&self, permissions: &AgentPermissions) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| permissions.policy.is_tool_enabled(t.name()))
            .map(|t| t.to_definition())
            .collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        tool_call_id: &str,
        arguments: Value,
        cwd: &Path,
        permissions: &AgentPermissions,
        cancel: CancelToken,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(tool_call_id, name, format!("tool not found: {name}"));
        };
        if !permissions.policy.is_tool_enabled(name) {
            return ToolResult::error(tool_call_id, name, "tool disabled by policy".to_string());
        }
        let services = SkillServices { permissions, cwd };
        tool.execute_cancellable(tool_call_id, arguments, &services, cancel)
            .await
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn list_read_only(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|(_, t)| t.is_read_only())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// Resolve and validate a required string argument, producing a
/// uniformly-shaped error `ToolResult` when missing.
pub fn required_str<'a>(
    args: &'a Value,
    key: &str,
    tool_call_id: &str,
    tool_name: &str,
) -> Result<&'a str, ToolResult> {
    args.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        ToolResult::error(
            tool_call_id,
            tool_name,
            format!("missing required parameter: {key}"),
        )
    })
}
