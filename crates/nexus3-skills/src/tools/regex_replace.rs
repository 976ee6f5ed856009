//! regex_replace — pattern-based find/replace across a single file's content.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{refuse_symlink_write, resolve_path, ResolveOptions};
use regex::Regex;
use serde_json::{json, Value};
use tokio::fs;

pub struct RegexReplaceTool;

#[async_trait::async_trait]
impl Tool for RegexReplaceTool {
    fn name(&self) -> &str {
        "regex_replace"
    }

    fn description(&self) -> &str {
        "Replace text in a file using a regular expression. Supports capture \
         group references ($1, $2, ...) in the replacement."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "pattern": { "type": "string", "description": "Regular expression to match" },
                "replacement": { "type": "string", "description": "Replacement text, may reference capture groups" },
                "replace_all": { "type": "boolean", "description": "Replace all matches (default: true)" }
            },
            "required": ["file_path", "pattern", "replacement"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let path = match required_str(&args, "file_path", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let pattern = match required_str(&args, "pattern", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let replacement = match required_str(&args, "replacement", tool_call_id, self.name()) {
            Ok(r) => r,
            Err(e) => return e,
        };
        let replace_all = args["replace_all"].as_bool().unwrap_or(true);

        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), format!("invalid regex: {e}")),
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

        let (new_content, count) = if replace_all {
            let count = regex.find_iter(&content).count();
            (regex.replace_all(&content, replacement).into_owned(), count)
        } else {
            let count = usize::from(regex.is_match(&content));
            (regex.replace(&content, replacement).into_owned(), count)
        };

        if count == 0 {
            return ToolResult::error(tool_call_id, self.name(), "pattern did not match");
        }

        if let Err(e) = refuse_symlink_write(&resolved) {
            return ToolResult::error(tool_call_id, self.name(), e.to_string());
        }

        match fs::write(&resolved, &new_content).await {
            Ok(()) => ToolResult::ok(tool_call_id, self.name(), format!("replaced {count} match(es) in {path}")),
            Err(e) => ToolResult::error(tool_call_id, self.name(), format!("failed to write: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn replaces_all_matches_by_default() {
        let dir = std::env::temp_dir().join("nexus3-regex-replace-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("f.txt"), "foo1 foo2").unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = RegexReplaceTool;
        let result = tool
            .execute(
                "id1",
                json!({"file_path": "f.txt", "pattern": r"foo(\d)", "replacement": "bar$1"}),
                &services,
            )
            .await;
        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.join("f.txt")).unwrap(), "bar1 bar2");
    }
}
