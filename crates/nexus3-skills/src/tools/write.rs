//! write_file — create or overwrite a file.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{refuse_symlink_write, resolve_path, ResolveOptions};
use serde_json::{json, Value};
use tokio::fs;

pub struct WriteFileTool;

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates parent directories if needed. \
         Overwrites the file if it exists. Prefer edit_file for modifications."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path to the file to write" },
                "content": { "type": "string", "description": "Content to write to the file" }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let path = match required_str(&args, "file_path", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let content = match required_str(&args, "content", tool_call_id, self.name()) {
            Ok(c) => c,
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

        if let Err(e) = refuse_symlink_write(&resolved) {
            return ToolResult::error(tool_call_id, self.name(), e.to_string());
        }

        if let Some(parent) = resolved.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(tool_call_id, self.name(), format!("failed to create directories: {e}"));
            }
        }

        match fs::write(&resolved, content).await {
            Ok(()) => ToolResult::ok(
                tool_call_id,
                self.name(),
                format!("wrote {} bytes to {}", content.len(), path),
            ),
            Err(e) => ToolResult::error(tool_call_id, self.name(), format!("failed to write: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn writes_new_file() {
        let dir = std::env::temp_dir().join("nexus3-write-test");
        std::fs::create_dir_all(&dir).unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = WriteFileTool;
        let result = tool
            .execute("id1", json!({"file_path": "out.txt", "content": "hi"}), &services)
            .await;
        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.join("out.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn sandboxed_write_outside_cwd_is_denied() {
        let dir = std::env::temp_dir().join("nexus3-write-test-2");
        std::fs::create_dir_all(&dir).unwrap();
        let permissions = resolve_preset("sandboxed", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = WriteFileTool;
        let result = tool
            .execute("id1", json!({"file_path": "/etc/nexus3-test.txt", "content": "hi"}), &services)
            .await;
        assert!(result.is_error());
    }
}
