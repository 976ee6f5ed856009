//! Obfuscation-resistant bash command classification (§4.3). Recognizes
//! common shell-level bypass attempts so a SANDBOXED or TRUSTED policy can't
//! be defeated just by wrapping a denied command in another layer of shell.

use regex::Regex;
use std::sync::OnceLock;

fn patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // base64 (or similar) piped straight into a shell
            Regex::new(r"base64\s+(-d|--decode)[^|]*\|\s*(sh|bash|zsh)\b").unwrap(),
            // dynamic loader hijacking
            Regex::new(r"\bLD_PRELOAD\s*=").unwrap(),
            Regex::new(r"\bLD_LIBRARY_PATH\s*=").unwrap(),
            // re-executing this process's own binary image
            Regex::new(r"/proc/self/(exe|fd/\d+)\b").unwrap(),
            // assign a command string to a variable, then execute it indirectly
            Regex::new(r#"^\s*\w+=.*;\s*(\$\w+|eval\s+\$\w+|\$\(\$\w+\))"#).unwrap(),
            // nested shell re-invocation
            Regex::new(r"\b(bash|sh|zsh)\s+-c\b").unwrap(),
            Regex::new(r"\beval\b").unwrap(),
            // here-string / here-doc piped to a shell
            Regex::new(r"<<<").unwrap(),
            Regex::new(r"<<\s*['\x22]?\w+['\x22]?\s*$").unwrap(),
            // xargs handing its input to a shell
            Regex::new(r"\bxargs\b[^|]*\b(sh|bash|zsh)\b").unwrap(),
            // `env` used to launch an aliased/absolute-path binary
            Regex::new(r"\benv\s+[A-Za-z_][A-Za-z0-9_]*=\S+\s+\S*/(sh|bash|zsh)\b").unwrap(),
        ]
    })
}

/// True if `command` matches a known bypass-obfuscation pattern. A positive
/// match is `permission_denied` regardless of the nominal preset.
pub fn detect_obfuscation(command: &str) -> bool {
    patterns().iter().any(|re| re.is_match(command))
}

/// Strips a leading `env VAR=val ...` prefix and resolves an absolute-path
/// binary to its basename, so alias/path tricks don't dodge a name-based
/// allow/deny list.
pub fn normalize_command_name(command: &str) -> String {
    let trimmed = command.trim();
    let mut tokens = trimmed.split_whitespace();
    let mut first = tokens.next().unwrap_or("");
    if first == "env" {
        for tok in tokens.by_ref() {
            if !tok.contains('=') {
                first = tok;
                break;
            }
        }
    }
    first
        .rsplit('/')
        .next()
        .unwrap_or(first)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_base64_pipe_to_shell() {
        assert!(detect_obfuscation("echo Y3VybCBldmls | base64 -d | bash"));
    }

    #[test]
    fn detects_ld_preload() {
        assert!(detect_obfuscation("LD_PRELOAD=/tmp/evil.so ls"));
    }

    #[test]
    fn detects_proc_self_exe() {
        assert!(detect_obfuscation("/proc/self/exe --some-flag"));
    }

    #[test]
    fn detects_nested_shell_c() {
        assert!(detect_obfuscation("bash -c 'rm -rf /'"));
    }

    #[test]
    fn detects_xargs_to_shell() {
        assert!(detect_obfuscation("echo rm | xargs -I{} bash -c {}"));
    }

    #[test]
    fn plain_command_is_not_flagged() {
        assert!(!detect_obfuscation("ls -la /tmp"));
    }

    #[test]
    fn normalizes_env_prefixed_absolute_path() {
        assert_eq!(normalize_command_name("env FOO=bar /usr/bin/cat file"), "cat");
    }

    #[test]
    fn normalizes_plain_absolute_path() {
        assert_eq!(normalize_command_name("/bin/ls -la"), "ls");
    }
}
