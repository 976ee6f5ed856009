//! glob — fast file pattern matching, rooted and sandboxed.

use crate::registry::{required_str, SkillServices, Tool};
use globset::GlobBuilder;
use nexus3_core::ToolResult;
use nexus3_permissions::{resolve_path, ResolveOptions};
use serde_json::{json, Value};
use walkdir::WalkDir;

pub struct GlobTool;

#[async_trait::async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern. Supports ** for recursive matching. \
         Returns file paths sorted by modification time (newest first)."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern (e.g. '**/*.rs')" },
                "path": { "type": "string", "description": "Directory to search in (default: agent cwd)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let pattern = match required_str(&args, "pattern", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let search_root = match args["path"].as_str() {
            Some(p) => match resolve_path(
                p,
                services.cwd,
                services.permissions,
                ResolveOptions { tool_name: Some(self.name()), must_exist: true, must_be_dir: true },
            ) {
                Ok(resolved) => resolved,
                Err(e) => return ToolResult::error(tool_call_id, self.name(), e.to_string()),
            },
            None => services.cwd.to_path_buf(),
        };

        let glob = match GlobBuilder::new(pattern).literal_separator(false).build() {
            Ok(g) => g.compile_matcher(),
            Err(e) => return ToolResult::error(tool_call_id, self.name(), format!("invalid glob pattern: {e}")),
        };

        let mut matches: Vec<(std::path::PathBuf, std::time::SystemTime)> = Vec::new();
        for entry in WalkDir::new(&search_root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && name != "node_modules" && name != "target"
            })
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                let rel_path = entry.path().strip_prefix(&search_root).unwrap_or(entry.path());
                if glob.is_match(rel_path) {
                    let mtime = entry
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                    matches.push((entry.path().to_path_buf(), mtime));
                }
            }
        }
        matches.sort_by(|a, b| b.1.cmp(&a.1));

        if matches.is_empty() {
            ToolResult::ok(tool_call_id, self.name(), "no files found")
        } else {
            let result: Vec<String> = matches.iter().take(1000).map(|(p, _)| p.to_string_lossy().to_string()).collect();
            ToolResult::ok(tool_call_id, self.name(), result.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn finds_matching_files() {
        let dir = std::env::temp_dir().join("nexus3-glob-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.rs"), "").unwrap();
        std::fs::write(dir.join("b.txt"), "").unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = GlobTool;
        let result = tool.execute("id1", json!({"pattern": "*.rs"}), &services).await;
        assert!(result.content.contains("a.rs"));
        assert!(!result.content.contains("b.txt"));
    }
}
