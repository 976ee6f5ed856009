//! patch — apply a unified diff to a single file.

use crate::registry::{required_str, SkillServices, Tool};
use nexus3_core::ToolResult;
use nexus3_permissions::{refuse_symlink_write, resolve_path, ResolveOptions};
use serde_json::{json, Value};
use tokio::fs;

pub struct PatchTool;

#[async_trait::async_trait]
impl Tool for PatchTool {
    fn name(&self) -> &str {
        "patch"
    }

    fn description(&self) -> &str {
        "Apply a unified diff (as produced by `diff -u`) to a single file. \
         Only the hunk bodies are used; file headers (---/+++) are ignored."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "diff": { "type": "string", "description": "Unified diff text" }
            },
            "required": ["file_path", "diff"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        let path = match required_str(&args, "file_path", tool_call_id, self.name()) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let diff = match required_str(&args, "diff", tool_call_id, self.name()) {
            Ok(d) => d,
            Err(e) => return e,
        };

        let resolved = match resolve_path(
            path,
            services.cwd,
            services.permissions,
            ResolveOptions { tool_name: Some(self.name()), must_exist: true, must_be_dir: false },
        ) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), e.to_string()),
        };

        let original = match fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), format!("failed to read file: {e}")),
        };

        let patched = match apply_unified_diff(&original, diff) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), e),
        };

        if let Err(e) = refuse_symlink_write(&resolved) {
            return ToolResult::error(tool_call_id, self.name(), e.to_string());
        }

        match fs::write(&resolved, &patched).await {
            Ok(()) => ToolResult::ok(tool_call_id, self.name(), format!("patched {path}")),
            Err(e) => ToolResult::error(tool_call_id, self.name(), format!("failed to write: {e}")),
        }
    }
}

/// Applies the hunks of a unified diff to `original`. Each hunk's context and
/// `-` lines must match the source at the hunk's declared start line;
/// mismatches are a hard error rather than a best-effort fuzzy apply.
fn apply_unified_diff(original: &str, diff: &str) -> Result<String, String> {
    let source_lines: Vec<&str> = original.lines().collect();
    let mut result: Vec<String> = Vec::new();
    let mut cursor = 0usize; // next unconsumed source line index

    let mut lines = diff.lines().peekable();
    while let Some(line) = lines.next() {
        if line.starts_with("---") || line.starts_with("+++") {
            continue;
        }
        if !line.starts_with("@@") {
            continue;
        }
        let header = parse_hunk_header(line).ok_or_else(|| format!("malformed hunk header: {line}"))?;
        let start = header.0.saturating_sub(1);
        if start < cursor {
            return Err("hunks are out of order or overlapping".to_string());
        }
        // copy unchanged lines up to the hunk start
        result.extend(source_lines[cursor..start].iter().map(|s| s.to_string()));
        cursor = start;

        while let Some(&next) = lines.peek() {
            if next.starts_with("@@") {
                break;
            }
            let hunk_line = lines.next().unwrap();
            if let Some(rest) = hunk_line.strip_prefix(' ') {
                if source_lines.get(cursor) != Some(&rest) {
                    return Err(format!("context mismatch at line {}: expected {:?}", cursor + 1, rest));
                }
                result.push(rest.to_string());
                cursor += 1;
            } else if let Some(rest) = hunk_line.strip_prefix('-') {
                if source_lines.get(cursor) != Some(&rest) {
                    return Err(format!("removal mismatch at line {}: expected {:?}", cursor + 1, rest));
                }
                cursor += 1;
            } else if let Some(rest) = hunk_line.strip_prefix('+') {
                result.push(rest.to_string());
            } else if hunk_line.is_empty() {
                // blank context line
                if source_lines.get(cursor) != Some(&"") {
                    return Err(format!("context mismatch at line {}", cursor + 1));
                }
                result.push(String::new());
                cursor += 1;
            } else {
                return Err(format!("unrecognized diff line: {hunk_line:?}"));
            }
        }
    }
    result.extend(source_lines[cursor..].iter().map(|s| s.to_string()));
    Ok(result.join("\n") + if original.ends_with('\n') { "\n" } else { "" })
}

/// Parses `@@ -l,s +l,s @@` into the source-side (line, span).
fn parse_hunk_header(line: &str) -> Option<(usize, usize)> {
    let inner = line.trim_start_matches("@@").trim();
    let minus = inner.split_whitespace().next()?;
    let spec = minus.strip_prefix('-')?;
    let mut parts = spec.split(',');
    let start: usize = parts.next()?.parse().ok()?;
    Some((start, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_simple_hunk() {
        let original = "line1\nline2\nline3\n";
        let diff = "--- a\n+++ b\n@@ -1,3 +1,3 @@\n line1\n-line2\n+line2 changed\n line3\n";
        let patched = apply_unified_diff(original, diff).unwrap();
        assert_eq!(patched, "line1\nline2 changed\nline3\n");
    }

    #[test]
    fn context_mismatch_is_an_error() {
        let original = "line1\nline2\n";
        let diff = "@@ -1,2 +1,2 @@\n wrong\n-line2\n+x\n";
        assert!(apply_unified_diff(original, diff).is_err());
    }
}
