//! append_file — append content to a file, creating it if absent.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{refuse_symlink_write, resolve_path, ResolveOptions};
use serde_json::{json, Value};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub struct AppendFileTool;

#[async_trait::async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &str {
        "append_file"
    }

    fn description(&self) -> &str {
        "Append content to the end of a file. Creates the file and parent \
         directories if they don't exist."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path to the file to append to" },
                "content": { "type": "string", "description": "Content to append" }
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
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(tool_call_id, self.name(), format!("failed to create directories: {e}"));
            }
        }

        let mut file = match OpenOptions::new().create(true).append(true).open(&resolved).await {
            Ok(f) => f,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), format!("failed to open: {e}")),
        };

        match file.write_all(content.as_bytes()).await {
            Ok(()) => ToolResult::ok(tool_call_id, self.name(), format!("appended {} bytes to {}", content.len(), path)),
            Err(e) => ToolResult::error(tool_call_id, self.name(), format!("failed to append: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn appends_to_existing_file() {
        let dir = std::env::temp_dir().join("nexus3-append-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("f.txt"), "a\n").unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = AppendFileTool;
        let result = tool
            .execute("id1", json!({"file_path": "f.txt", "content": "b\n"}), &services)
            .await;
        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.join("f.txt")).unwrap(), "a\nb\n");
    }
}
