//! bash — execute shell commands with timeout, process-group kill on
//! timeout/cancellation, and obfuscation-resistant denial (§4.3, §4.9).

use crate::registry::{SkillServices, Tool};
use nexus3_core::{CancelToken, ToolResult};
use nexus3_permissions::detect_obfuscation;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_CHARS: usize = 30_000;

pub struct BashTool;

#[cfg(unix)]
fn spawn_in_new_group(command: &str, cwd: &std::path::Path) -> std::io::Result<tokio::process::Child> {
    use std::os::unix::process::CommandExt;
    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .kill_on_drop(true)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }
    cmd.spawn()
}

#[cfg(not(unix))]
fn spawn_in_new_group(command: &str, cwd: &std::path::Path) -> std::io::Result<tokio::process::Child> {
    Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .kill_on_drop(true)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command. Use for git, npm, docker, system commands. \
         Captures stdout and stderr. Set timeout in seconds (default 120, max 600)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The bash command to execute" },
                "timeout": { "type": "integer", "description": "Timeout in seconds (default 120, max 600)" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, tool_call_id: &str, args: Value, services: &SkillServices<'_>) -> ToolResult {
        self.execute_cancellable(tool_call_id, args, services, CancelToken::new())
            .await
    }

    async fn execute_cancellable(
        &self,
        tool_call_id: &str,
        args: Value,
        services: &SkillServices<'_>,
        cancel: CancelToken,
    ) -> ToolResult {
        let command = match args["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::error(tool_call_id, self.name(), "missing required parameter: command"),
        };

        if !services.permissions.policy.is_tool_enabled(self.name()) {
            return ToolResult::error(tool_call_id, self.name(), "tool disabled by policy");
        }

        if detect_obfuscation(command) {
            return ToolResult::error(
                tool_call_id,
                self.name(),
                "command denied: matches a known shell-obfuscation pattern",
            );
        }

        let timeout_secs = args["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS).min(MAX_TIMEOUT_SECS);

        let mut child = match spawn_in_new_group(command, services.cwd) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(tool_call_id, self.name(), format!("failed to spawn: {e}")),
        };
        let pid = child.id().unwrap_or(0);

        tokio::select! {
            result = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), child.wait_with_output()) => {
                match result {
                    Ok(Ok(output)) => format_output(tool_call_id, self.name(), &output),
                    Ok(Err(e)) => ToolResult::error(tool_call_id, self.name(), format!("failed to wait: {e}")),
                    Err(_) => {
                        kill_group(pid);
                        ToolResult::error(tool_call_id, self.name(), format!("command timed out after {timeout_secs}s"))
                    }
                }
            }
            _ = cancel.cancelled_fut() => {
                kill_group(pid);
                ToolResult::cancelled(tool_call_id, self.name())
            }
        }
    }
}

fn format_output(tool_call_id: &str, name: &str, output: &std::process::Output) -> ToolResult {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        let message = format!(
            "exit code: {}\n{}\n{}",
            output.status.code().unwrap_or(-1),
            stdout.trim(),
            stderr.trim()
        );
        return ToolResult::error(tool_call_id, name, truncate(&message));
    }

    let result = if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        format!("{}\n{}", stdout.trim(), stderr.trim())
    };

    if result.is_empty() {
        ToolResult::ok(tool_call_id, name, "(no output)")
    } else {
        ToolResult::ok(tool_call_id, name, truncate(&result))
    }
}

fn truncate(s: &str) -> String {
    if s.len() > MAX_OUTPUT_CHARS {
        format!("{}\n... [truncated, {} total chars]", &s[..MAX_OUTPUT_CHARS], s.len())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_permissions::resolve_preset;

    #[tokio::test]
    async fn runs_plain_command() {
        let dir = std::env::temp_dir();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = BashTool;
        let result = tool.execute("id1", json!({"command": "echo hi"}), &services).await;
        assert!(!result.is_error());
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn denies_obfuscated_command() {
        let dir = std::env::temp_dir();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = BashTool;
        let result = tool
            .execute("id1", json!({"command": "bash -c 'echo hi'"}), &services)
            .await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn times_out_long_running_command() {
        let dir = std::env::temp_dir();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let services = SkillServices { permissions: &permissions, cwd: &dir };
        let tool = BashTool;
        let result = tool
            .execute("id1", json!({"command": "sleep 5", "timeout": 1}), &services)
            .await;
        assert!(result.is_error());
    }
}
