//! grep — regex content search, rooted and sandboxed.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{resolve_path, ResolveOptions};
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use walkdir::WalkDir;

const MAX_RESULTS: usize = 5000;

pub struct GrepTool;

#[async_trait::async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents using regex patterns. Returns matching file paths by default, \
         or matching lines with context. Use glob to filter files."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "path": { "type": "string", "description": "File or directory to search (default: agent cwd)" },
                "glob": { "type": "string", "description": "Glob pattern to filter files" },
                "output_mode": { "type": "string", "enum": ["files_with_matches", "content", "count"] },
                "case_insensitive": { "type": "boolean" },
                "context": { "type": "integer", "description": "Lines of context around matches (content mode)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let pattern_str = match required_str(&args, "pattern", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let case_insensitive = args["case_insensitive"].as_bool().unwrap_or(false);
        let regex_pattern = if case_insensitive { format!("(?i){pattern_str}") } else { pattern_str.to_string() };
        let regex = match Regex::new(&regex_pattern) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), format!("invalid regex: {e}")),
        };

        let search_root = match args["path"].as_str() {
            Some(p) => match resolve_path(
                p,
                services.cwd,
                services.permissions,
                ResolveOptions { tool_name: Some(self.name()), must_exist: true, must_be_dir: false },
            ) {
                Ok(resolved) => resolved,
                Err(e) => return ToolResult::error(tool_call_id, self.name(), e.to_string()),
            },
            None => services.cwd.to_path_buf(),
        };

        let output_mode = args["output_mode"].as_str().unwrap_or("files_with_matches");
        let context_lines = args["context"].as_u64().unwrap_or(0) as usize;
        let file_glob = args["glob"].as_str().and_then(|g| {
            globset::GlobBuilder::new(g).literal_separator(false).build().ok().map(|g| g.compile_matcher())
        });

        if search_root.is_file() {
            return search_file(tool_call_id, self.name(), &search_root, &regex, output_mode, context_lines);
        }

        let mut results = Vec::new();
        for entry in WalkDir::new(&search_root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && name != "node_modules" && name != "target"
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(ref glob) = file_glob {
                let name = entry.file_name().to_string_lossy();
                if !glob.is_match(name.as_ref()) {
                    continue;
                }
            }
            if let Ok(bytes) = std::fs::read(entry.path()) {
                if bytes.len() > 512 && bytes[..512].contains(&0) {
                    continue;
                }
            } else {
                continue;
            }
            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(_) => continue,
            };
            if regex.is_match(&content) {
                collect_matches(entry.path(), &content, &regex, output_mode, context_lines, &mut results);
            }
            if results.len() > MAX_RESULTS {
                break;
            }
        }

        if results.is_empty() {
            ToolResult::ok(tool_call_id, self.name(), "no matches found")
        } else {
            ToolResult::ok(tool_call_id, self.name(), results.join("\n"))
        }
    }
}

fn collect_matches(
    path: &Path,
    content: &str,
    regex: &Regex,
    output_mode: &str,
    context_lines: usize,
    results: &mut Vec<String>,
) {
    match output_mode {
        "files_with_matches" => results.push(path.to_string_lossy().to_string()),
        "count" => {
            let count = regex.find_iter(content).count();
            results.push(format!("{}:{}", path.display(), count));
        }
        _ => {
            let lines: Vec<&str> = content.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if regex.is_match(line) {
                    let start = i.saturating_sub(context_lines);
                    let end = (i + context_lines + 1).min(lines.len());
                    for j in start..end {
                        let prefix = if j == i { ">" } else { " " };
                        results.push(format!("{}{}:{}:{}", prefix, path.display(), j + 1, lines[j]));
                    }
                    if context_lines > 0 && end < lines.len() {
                        results.push("--".to_string());
                    }
                }
            }
        }
    }
}

fn search_file(
    tool_call_id: &str,
    name: &str,
    path: &Path,
    regex: &Regex,
    output_mode: &str,
    context_lines: usize,
) -> ToolResult {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return ToolResult::error(tool_call_id, name, format!("failed to read: {e}")),
    };
    if !regex.is_match(&content) {
        return ToolResult::ok(tool_call_id, name, "no matches found");
    }
    let mut results = Vec::new();
    collect_matches(path, &content, regex, output_mode, context_lines, &mut results);
    ToolResult::ok(tool_call_id, name, results.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn finds_matching_lines() {
        let dir = std::env::temp_dir().join("nexus3-grep-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), "hello\nworld\n").unwrap();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = GrepTool;
        let result = tool
            .execute("id1", json!({"pattern": "world", "output_mode": "content"}), &services)
            .await;
        assert!(result.content.contains("world"));
    }
}
