//! edit_file — find and replace an exact string match in a file.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{refuse_symlink_write, resolve_path, ResolveOptions};
use serde_json::{json, Value};
use tokio::fs;

pub struct EditFileTool;

#[async_trait::async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing an exact string match. The old_string must appear \
         exactly once in the file. Use replace_all to replace all occurrences."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path to the file to edit" },
                "old_string": { "type": "string", "description": "Exact text to find and replace" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": { "type": "boolean", "description": "Replace all occurrences (default: false)" }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let path = match required_str(&args, "file_path", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let old = match required_str(&args, "old_string", tool_call_id, self.name()) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let new = match required_str(&args, "new_string", tool_call_id, self.name()) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let replace_all = args["replace_all"].as_bool().unwrap_or(false);

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

        if !content.contains(old) {
            return ToolResult::error(tool_call_id, self.name(), "old_string not found in file");
        }

        let new_content = if replace_all {
            content.replace(old, new)
        } else {
            let count = content.matches(old).count();
            if count > 1 {
                return ToolResult::error(
                    tool_call_id,
                    self.name(),
                    format!("old_string found {count} times — must be unique. Use replace_all or provide more context."),
                );
            }
            content.replacen(old, new, 1)
        };

        if let Err(e) = refuse_symlink_write(&resolved) {
            return ToolResult::error(tool_call_id, self.name(), e.to_string());
        }

        match fs::write(&resolved, &new_content).await {
            Ok(()) => ToolResult::ok(tool_call_id, self.name(), format!("edited {path}")),
            Err(e) => ToolResult::error(tool_call_id, self.name(), format!("failed to write: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn rejects_ambiguous_match() {
        let dir = std::env::temp_dir().join("nexus3-edit-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("f.txt"), "foo\nfoo\n").unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = EditFileTool;
        let result = tool
            .execute("id1", json!({"file_path": "f.txt", "old_string": "foo", "new_string": "bar"}), &services)
            .await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn replace_all_replaces_every_occurrence() {
        let dir = std::env::temp_dir().join("nexus3-edit-test-2");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("f.txt"), "foo\nfoo\n").unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = EditFileTool;
        let result = tool
            .execute(
                "id1",
                json!({"file_path": "f.txt", "old_string": "foo", "new_string": "bar", "replace_all": true}),
                &services,
            )
            .await;
        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.join("f.txt")).unwrap(), "bar\nbar\n");
    }
}
