//! Path Resolver / Sandbox (§4.4): expand → join → canonicalize → contain.

use std::path::{Path, PathBuf};

use nexus3_core::{Error, PathSecurityReason, Result};

use crate::policy::AgentPermissions;

/// Expands a leading `~` and `$VAR`/`${VAR}` references. Deliberately simple:
/// only whole-component `~` and POSIX-style variable references are handled,
/// matching what a path argument from a tool call actually looks like.
fn expand(input: &str) -> String {
    let mut s = input.to_string();
    if s == "~" || s.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            s = home.join(&s[1.min(s.len())..].trim_start_matches('/')).to_string_lossy().into_owned();
        }
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }
            let mut name = String::new();
            while let Some(&c2) = chars.peek() {
                if c2.is_ascii_alphanumeric() || c2 == '_' {
                    name.push(c2);
                    chars.next();
                } else {
                    break;
                }
            }
            if braced && chars.peek() == Some(&'}') {
                chars.next();
            }
            if let Ok(val) = std::env::var(&name) {
                out.push_str(&val);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Canonicalizes as much of `path` as exists, then rejoins the remaining
/// (not-yet-created) components unresolved. Used so a sandbox check on a
/// not-yet-existing write target still resolves against the real parent
/// directory (following any symlinks in it).
fn canonicalize_partial(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.metadata() {
            Ok(_) => break,
            Err(_) => {
                let Some(parent) = existing.parent() else {
                    break;
                };
                if let Some(name) = existing.file_name() {
                    remainder.push(name.to_os_string());
                }
                existing = parent;
            }
        }
    }
    let mut resolved = existing.canonicalize().unwrap_or_else(|_| existing.to_path_buf());
    for component in remainder.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

pub struct ResolveOptions<'a> {
    pub tool_name: Option<&'a str>,
    pub must_exist: bool,
    pub must_be_dir: bool,
}

impl<'a> Default for ResolveOptions<'a> {
    fn default() -> Self {
        Self {
            tool_name: None,
            must_exist: false,
            must_be_dir: false,
        }
    }
}

/// Resolves `input_path` against `cwd` under `permissions`, enforcing
/// sandbox containment. Returns the canonical absolute path on success.
pub fn resolve_path(
    input_path: &str,
    cwd: &Path,
    permissions: &AgentPermissions,
    opts: ResolveOptions,
) -> Result<PathBuf> {
    let expanded = expand(input_path);
    let joined = {
        let p = PathBuf::from(&expanded);
        if p.is_absolute() {
            p
        } else {
            cwd.join(p)
        }
    };

    let resolved = canonicalize_partial(&joined)
        .map_err(|_| Error::path_security(input_path, joined.display().to_string(), PathSecurityReason::NotFound))?;

    if opts.must_exist && !resolved.exists() {
        return Err(Error::path_security(
            input_path,
            resolved.display().to_string(),
            PathSecurityReason::NotFound,
        ));
    }

    let tool_name = opts.tool_name.unwrap_or("");
    let allowed = permissions.policy.effective_allowed_paths(tool_name);

    match &allowed {
        None => {}
        Some(allowed_paths) => {
            if allowed_paths.is_empty() {
                return Err(Error::path_security(
                    input_path,
                    resolved.display().to_string(),
                    PathSecurityReason::NotAllowed,
                ));
            }
            let contained = allowed_paths.iter().any(|p| {
                let canonical_allowed = p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
                resolved.starts_with(&canonical_allowed)
            });
            if !contained {
                return Err(Error::path_security(
                    input_path,
                    resolved.display().to_string(),
                    PathSecurityReason::EscapesSandbox,
                ));
            }
        }
    }

    if opts.must_be_dir && resolved.exists() && !resolved.is_dir() {
        return Err(Error::path_security(
            input_path,
            resolved.display().to_string(),
            PathSecurityReason::NotDirectory,
        ));
    }

    Ok(resolved)
}

/// Checks that `path`, if it exists, is not itself a symlink — writers must
/// refuse to follow/overwrite through one rather than silently resolving it.
pub fn refuse_symlink_write(path: &Path) -> Result<()> {
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if meta.file_type().is_symlink() {
            return Err(Error::path_security(
                path.display().to_string(),
                path.display().to_string(),
                PathSecurityReason::SymlinkEscape,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::resolve_preset;

    #[test]
    fn resolves_relative_path_against_cwd() {
        let cwd = std::env::temp_dir();
        let perms = resolve_preset("yolo", &cwd).unwrap();
        let resolved = resolve_path("some/file.txt", &cwd, &perms, ResolveOptions::default()).unwrap();
        assert!(resolved.starts_with(cwd.canonicalize().unwrap()));
    }

    #[test]
    fn sandboxed_read_outside_allowed_paths_is_denied() {
        let cwd = std::env::temp_dir().join("nexus3-sandbox-test");
        std::fs::create_dir_all(&cwd).unwrap();
        let perms = resolve_preset("sandboxed", &cwd).unwrap();
        let result = resolve_path("/etc/passwd", &cwd, &perms, ResolveOptions::default());
        assert!(matches!(result, Err(Error::PathSecurity { .. })));
    }

    #[test]
    fn sandboxed_read_inside_allowed_paths_succeeds() {
        let cwd = std::env::temp_dir().join("nexus3-sandbox-test-2");
        std::fs::create_dir_all(&cwd).unwrap();
        let perms = resolve_preset("sandboxed", &cwd).unwrap();
        let result = resolve_path("inner.txt", &cwd, &perms, ResolveOptions::default());
        assert!(result.is_ok());
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            let cwd = std::env::temp_dir();
            let perms = resolve_preset("yolo", &cwd).unwrap();
            let resolved = resolve_path("~/somefile", &cwd, &perms, ResolveOptions::default()).unwrap();
            assert!(resolved.starts_with(home.canonicalize().unwrap_or(home)));
        }
    }
}
