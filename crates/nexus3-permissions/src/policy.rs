//! Permission Model (§4.3): presets, the ceiling-invariant delta merge, and
//! session-scoped confirmation allowances.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use nexus3_core::{Error, Result};

/// Tools that mutate the filesystem. Referenced both by the sandboxed preset
/// (to default-deny them) and by the dispatcher's `create_agent` write-path
/// wiring (§4.11).
pub const WRITE_CAPABLE_TOOLS: &[&str] = &[
    "write_file",
    "edit_file",
    "append_file",
    "regex_replace",
    "mkdir",
    "copy_file",
    "rename",
    "patch",
];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Least permissive: ordered first so `Ord` doubles as a restrictiveness ranking.
    Sandboxed,
    Trusted,
    Yolo,
}

/// Per-tool path override. `allowed_paths: None` means "use the policy-level
/// value"; `Some(vec![])` means "deny entirely for this tool".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolOverride {
    #[serde(default)]
    pub allowed_paths: Option<Vec<PathBuf>>,
}

/// A destructive action class gated by `require_confirm_for`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Write,
    Edit,
    Exec,
    Net,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionPolicy {
    pub level: PermissionLevel,
    /// `None` = unrestricted (any path allowed). `Some(vec![])` = deny all.
    pub allowed_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub disabled_tools: HashSet<String>,
    #[serde(default)]
    pub tool_overrides: HashMap<String, ToolOverride>,
    #[serde(default)]
    pub require_confirm_for: HashSet<Action>,
    #[serde(default)]
    pub allow_insecure_http: bool,
}

impl PermissionPolicy {
    pub fn is_tool_enabled(&self, name: &str) -> bool {
        !self.disabled_tools.contains(name)
    }

    /// Effective allowed-paths for a given tool: its override if present,
    /// otherwise the policy-level value.
    pub fn effective_allowed_paths(&self, tool_name: &str) -> Option<Vec<PathBuf>> {
        match self.tool_overrides.get(tool_name) {
            Some(o) if o.allowed_paths.is_some() => o.allowed_paths.clone(),
            _ => self.allowed_paths.clone(),
        }
    }
}

/// A proposed restriction of a parent policy. Every axis is either narrower
/// than or equal to the parent's; `apply_delta` enforces this.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PermissionDelta {
    #[serde(default)]
    pub level: Option<PermissionLevel>,
    #[serde(default)]
    pub allowed_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub disabled_tools: HashSet<String>,
    #[serde(default)]
    pub tool_overrides: HashMap<String, ToolOverride>,
}

fn canonical_or_self(p: &Path) -> PathBuf {
    p.canonicalize().unwrap_or_else(|_| p.to_path_buf())
}

fn is_subset_of(child: &[PathBuf], parent: &[PathBuf]) -> bool {
    child.iter().all(|c| {
        let cc = canonical_or_self(c);
        parent
            .iter()
            .any(|p| cc.starts_with(canonical_or_self(p)))
    })
}

/// Produces a child policy whose every axis is the intersection of `parent`'s
/// axis and `delta`'s proposal. Never widens permissiveness.
pub fn apply_delta(parent: &PermissionPolicy, delta: &PermissionDelta) -> Result<PermissionPolicy> {
    let level = match delta.level {
        Some(proposed) if proposed <= parent.level => proposed,
        Some(_) => parent.level,
        None => parent.level,
    };

    let allowed_paths = match (&parent.allowed_paths, &delta.allowed_paths) {
        (None, Some(child)) => Some(child.clone()),
        (None, None) => None,
        (Some(parent_paths), Some(child_paths)) => {
            if is_subset_of(child_paths, parent_paths) {
                Some(child_paths.clone())
            } else {
                return Err(Error::PermissionDenied(
                    "delta proposes allowed_paths outside the parent's set".to_string(),
                ));
            }
        }
        (Some(parent_paths), None) => Some(parent_paths.clone()),
    };

    let mut disabled_tools = parent.disabled_tools.clone();
    disabled_tools.extend(delta.disabled_tools.iter().cloned());

    let mut tool_overrides = parent.tool_overrides.clone();
    for (name, child_override) in &delta.tool_overrides {
        let merged = match &child_override.allowed_paths {
            Some(child_paths) => {
                // A tool with no override entry on the parent still inherits
                // the parent's policy-level allowed_paths (§4.3 ceiling
                // invariant): "no override" is not "unconstrained".
                match parent.effective_allowed_paths(name) {
                    Some(parent_paths) if !is_subset_of(child_paths, &parent_paths) => {
                        return Err(Error::PermissionDenied(format!(
                            "tool override for {name} escapes parent's allowed_paths"
                        )));
                    }
                    _ => ToolOverride {
                        allowed_paths: Some(child_paths.clone()),
                    },
                }
            }
            None => parent.tool_overrides.get(name).cloned().unwrap_or_default(),
        };
        tool_overrides.insert(name.clone(), merged);
    }

    Ok(PermissionPolicy {
        level,
        allowed_paths,
        disabled_tools,
        tool_overrides,
        require_confirm_for: parent.require_confirm_for.clone(),
        allow_insecure_http: parent.allow_insecure_http,
    })
}

/// Decision returned by a confirmation callback (§4.9).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmDecision {
    Once,
    ThisFile,
    ThisDir,
    Global,
    Deny,
}

/// Grants accumulated from confirmation callbacks during a session. `Once`
/// grants are never stored here; they cover exactly the call that earned them.
#[derive(Clone, Debug, Default)]
pub struct SessionAllowances {
    global: HashSet<Action>,
    dirs: HashMap<Action, Vec<PathBuf>>,
    files: HashMap<Action, Vec<PathBuf>>,
}

impl SessionAllowances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: Action, decision: ConfirmDecision, subject: Option<&Path>) {
        match decision {
            ConfirmDecision::Once | ConfirmDecision::Deny => {}
            ConfirmDecision::Global => {
                self.global.insert(action);
            }
            ConfirmDecision::ThisDir => {
                if let Some(p) = subject {
                    self.dirs.entry(action).or_default().push(p.to_path_buf());
                }
            }
            ConfirmDecision::ThisFile => {
                if let Some(p) = subject {
                    self.files.entry(action).or_default().push(p.to_path_buf());
                }
            }
        }
    }

    pub fn is_allowed(&self, action: Action, subject: &Path) -> bool {
        if self.global.contains(&action) {
            return true;
        }
        if let Some(files) = self.files.get(&action) {
            if files.iter().any(|f| f == subject) {
                return true;
            }
        }
        if let Some(dirs) = self.dirs.get(&action) {
            if dirs.iter().any(|d| subject.starts_with(d)) {
                return true;
            }
        }
        false
    }
}

#[derive(Clone, Debug)]
pub struct AgentPermissions {
    pub policy: PermissionPolicy,
    pub allowances: SessionAllowances,
}

impl AgentPermissions {
    pub fn can_read(&self, absolute_path: &Path) -> bool {
        match &self.policy.allowed_paths {
            None => true,
            Some(allowed) => allowed
                .iter()
                .any(|p| canonical_or_self(absolute_path).starts_with(canonical_or_self(p))),
        }
    }

    pub fn can_write(&self, absolute_path: &Path) -> bool {
        if WRITE_CAPABLE_TOOLS
            .iter()
            .all(|t| self.policy.disabled_tools.contains(*t))
        {
            return false;
        }
        self.can_read(absolute_path)
    }

    pub fn requires_confirmation(&self, action: Action, subject: &Path) -> bool {
        self.policy.level == PermissionLevel::Trusted
            && self.policy.require_confirm_for.contains(&action)
            && !self.allowances.is_allowed(action, subject)
    }
}

/// Resolves one of the three built-in presets, substituting `cwd` into
/// path-relative fields.
pub fn resolve_preset(name: &str, cwd: &Path) -> Result<AgentPermissions> {
    let policy = match name {
        "yolo" => PermissionPolicy {
            level: PermissionLevel::Yolo,
            allowed_paths: None,
            disabled_tools: HashSet::new(),
            tool_overrides: HashMap::new(),
            require_confirm_for: HashSet::new(),
            allow_insecure_http: true,
        },
        "trusted" => PermissionPolicy {
            level: PermissionLevel::Trusted,
            allowed_paths: None,
            disabled_tools: HashSet::new(),
            tool_overrides: HashMap::new(),
            require_confirm_for: [Action::Write, Action::Edit, Action::Exec, Action::Net]
                .into_iter()
                .collect(),
            allow_insecure_http: false,
        },
        "sandboxed" => {
            let mut tool_overrides = HashMap::new();
            for tool in WRITE_CAPABLE_TOOLS {
                tool_overrides.insert(
                    tool.to_string(),
                    ToolOverride {
                        allowed_paths: Some(vec![]),
                    },
                );
            }
            PermissionPolicy {
                level: PermissionLevel::Sandboxed,
                allowed_paths: Some(vec![cwd.to_path_buf()]),
                disabled_tools: HashSet::new(),
                tool_overrides,
                require_confirm_for: HashSet::new(),
                allow_insecure_http: false,
            }
        }
        other => {
            return Err(Error::InvalidParams(format!("unknown preset: {other}")));
        }
    };
    Ok(AgentPermissions {
        policy,
        allowances: SessionAllowances::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_preset_is_rejected() {
        assert!(resolve_preset("worker", Path::new("/tmp")).is_err());
    }

    #[test]
    fn yolo_is_unrestricted() {
        let p = resolve_preset("yolo", Path::new("/tmp")).unwrap();
        assert!(p.can_read(Path::new("/etc/passwd")));
        assert_eq!(p.policy.level, PermissionLevel::Yolo);
    }

    #[test]
    fn sandboxed_denies_writes_without_override() {
        let p = resolve_preset("sandboxed", Path::new("/tmp/work")).unwrap();
        assert!(!p.can_write(Path::new("/tmp/work/file.txt")));
    }

    #[test]
    fn delta_cannot_widen_level() {
        let parent = resolve_preset("sandboxed", Path::new("/tmp")).unwrap();
        let delta = PermissionDelta {
            level: Some(PermissionLevel::Yolo),
            ..Default::default()
        };
        let child = apply_delta(&parent.policy, &delta).unwrap();
        assert_eq!(child.level, PermissionLevel::Sandboxed);
    }

    #[test]
    fn delta_cannot_escape_parent_allowed_paths() {
        let parent = PermissionPolicy {
            level: PermissionLevel::Sandboxed,
            allowed_paths: Some(vec![PathBuf::from("/tmp/sandbox")]),
            disabled_tools: HashSet::new(),
            tool_overrides: HashMap::new(),
            require_confirm_for: HashSet::new(),
            allow_insecure_http: false,
        };
        let delta = PermissionDelta {
            allowed_paths: Some(vec![PathBuf::from("/etc")]),
            ..Default::default()
        };
        assert!(apply_delta(&parent, &delta).is_err());
    }

    #[test]
    fn delta_cannot_escape_via_tool_override_with_no_prior_parent_override() {
        // Parent has no `tool_overrides` entry for "read_file" at all, but
        // does have a policy-level `allowed_paths`. A child delta attaching
        // a fresh override for that tool must still be checked against the
        // parent's policy-level paths, not treated as unconstrained.
        let parent = PermissionPolicy {
            level: PermissionLevel::Sandboxed,
            allowed_paths: Some(vec![PathBuf::from("/tmp/sandbox")]),
            disabled_tools: HashSet::new(),
            tool_overrides: HashMap::new(),
            require_confirm_for: HashSet::new(),
            allow_insecure_http: false,
        };
        let mut tool_overrides = HashMap::new();
        tool_overrides.insert(
            "read_file".to_string(),
            ToolOverride { allowed_paths: Some(vec![PathBuf::from("/etc")]) },
        );
        let delta = PermissionDelta { tool_overrides, ..Default::default() };
        assert!(apply_delta(&parent, &delta).is_err());
    }

    #[test]
    fn delta_tool_override_allowed_when_parent_is_unrestricted() {
        let parent = PermissionPolicy {
            level: PermissionLevel::Trusted,
            allowed_paths: None,
            disabled_tools: HashSet::new(),
            tool_overrides: HashMap::new(),
            require_confirm_for: HashSet::new(),
            allow_insecure_http: false,
        };
        let mut tool_overrides = HashMap::new();
        tool_overrides.insert(
            "write_file".to_string(),
            ToolOverride { allowed_paths: Some(vec![PathBuf::from("/tmp/anywhere")]) },
        );
        let delta = PermissionDelta { tool_overrides, ..Default::default() };
        let child = apply_delta(&parent, &delta).unwrap();
        assert_eq!(
            child.tool_overrides["write_file"].allowed_paths,
            Some(vec![PathBuf::from("/tmp/anywhere")])
        );
    }

    #[test]
    fn allowed_paths_null_vs_empty_roundtrip() {
        let unrestricted = PermissionPolicy {
            level: PermissionLevel::Yolo,
            allowed_paths: None,
            disabled_tools: HashSet::new(),
            tool_overrides: HashMap::new(),
            require_confirm_for: HashSet::new(),
            allow_insecure_http: true,
        };
        let deny_all = PermissionPolicy {
            allowed_paths: Some(vec![]),
            ..unrestricted.clone()
        };
        let u = serde_json::to_value(&unrestricted).unwrap();
        let d = serde_json::to_value(&deny_all).unwrap();
        assert!(u["allowed_paths"].is_null());
        assert!(d["allowed_paths"].as_array().unwrap().is_empty());
    }
}
