//! read_file — read file contents with optional offset/limit, routed through
//! the path sandbox (§4.4).

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{resolve_path, ResolveOptions};
use serde_json::{json, Value};
use tokio::fs;

pub struct ReadFileTool;

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Returns numbered lines. Use offset/limit for large files."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default 2000)"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let path = match required_str(&args, "file_path", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let resolved = match resolve_path(
            path,
            services.cwd,
            services.permissions,
            ResolveOptions {
                tool_name: Some(self.name()),
                must_exist: true,
                must_be_dir: false,
            },
        ) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), e.to_string()),
        };

        let content = match fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), format!("failed to read file: {e}")),
        };

        let offset = args["offset"].as_u64().unwrap_or(1) as usize;
        let limit = args["limit"].as_u64().unwrap_or(2000) as usize;

        let lines: Vec<&str> = content.lines().collect();
        let start = (offset.saturating_sub(1)).min(lines.len());
        let end = (start + limit).min(lines.len());

        let result: Vec<String> = lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{}", start + i + 1, line))
            .collect();

        ToolResult::ok(tool_call_id, self.name(), result.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn reads_existing_file_with_line_numbers() {
        let dir = std::env::temp_dir().join("nexus3-read-test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("hello.txt");
        std::fs::write(&file, "a\nb\nc\n").unwrap();

        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices {
            permissions: &permissions,
            cwd: &dir,
        };
        let tool = ReadFileTool;
        let result = tool
            .execute("id1", json!({"file_path": "hello.txt"}), &services)
            .await;
        assert!(!result.is_error());
        assert!(result.content.contains("1\ta"));
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let dir = std::env::temp_dir().join("nexus3-read-test-missing");
        std::fs::create_dir_all(&dir).unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices {
            permissions: &permissions,
            cwd: &dir,
        };
        let tool = ReadFileTool;
        let result = tool
            .execute("id1", json!({"file_path": "nope.txt"}), &services)
            .await;
        assert!(result.is_error());
    }
}
