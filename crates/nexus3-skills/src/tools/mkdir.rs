//! mkdir — create a directory, idempotently for non-symlink targets.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{resolve_path, ResolveOptions};
use serde_json::{json, Value};

pub struct MkdirTool;

#[async_trait::async_trait]
impl Tool for MkdirTool {
    fn name(&self) -> &str {
        "mkdir"
    }

    fn description(&self) -> &str {
        "Create a directory, including any missing parent directories. \
         Succeeds if the directory already exists."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to create" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let path = match required_str(&args, "path", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let resolved = match resolve_path(
            path,
            services.cwd,
            services.permissions,
            ResolveOptions {
                tool_name: Some(self.name()),
                must_exist: false,
                must_be_dir: false,
            },
        ) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), e.to_string()),
        };

        if let Ok(meta) = std::fs::symlink_metadata(&resolved) {
            if meta.file_type().is_symlink() {
                return ToolResult::error(tool_call_id, self.name(), "refusing to create through a symlink");
            }
        }

        match tokio::fs::create_dir_all(&resolved).await {
            Ok(()) => ToolResult::ok(tool_call_id, self.name(), format!("created directory {path}")),
            Err(e) => ToolResult::error(tool_call_id, self.name(), format!("failed to create directory: {e}")),
        }
    }
}
