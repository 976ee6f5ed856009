//! rename — move/rename a file or directory within the sandbox.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{refuse_symlink_write, resolve_path, ResolveOptions};
use serde_json::{json, Value};

pub struct RenameTool;

#[async_trait::async_trait]
impl Tool for RenameTool {
    fn name(&self) -> &str {
        "rename"
    }

    fn description(&self) -> &str {
        "Rename or move a file or directory to a new path."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": { "type": "string" },
                "destination": { "type": "string" }
            },
            "required": ["source", "destination"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let source = match required_str(&args, "source", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let destination = match required_str(&args, "destination", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let resolved_source = match resolve_path(
            source,
            services.cwd,
            services.permissions,
            ResolveOptions { tool_name: Some(self.name()), must_exist: true, must_be_dir: false },
        ) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), e.to_string()),
        };
        let resolved_dest = match resolve_path(
            destination,
            services.cwd,
            services.permissions,
            ResolveOptions { tool_name: Some(self.name()), must_exist: false, must_be_dir: false },
        ) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), e.to_string()),
        };

        if let Err(e) = refuse_symlink_write(&resolved_dest) {
            return ToolResult::error(tool_call_id, self.name(), e.to_string());
        }

        match tokio::fs::rename(&resolved_source, &resolved_dest).await {
            Ok(()) => ToolResult::ok(tool_call_id, self.name(), format!("renamed {source} to {destination}")),
            Err(e) => ToolResult::error(tool_call_id, self.name(), format!("failed to rename: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn renames_file() {
        let dir = std::env::temp_dir().join("nexus3-rename-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), "x").unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = RenameTool;
        let result = tool
            .execute("id1", json!({"source": "a.txt", "destination": "b.txt"}), &services)
            .await;
        assert!(!result.is_error());
        assert!(!dir.join("a.txt").exists());
        assert!(dir.join("b.txt").exists());
    }
}
