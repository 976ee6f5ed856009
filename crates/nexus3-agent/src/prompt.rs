//! Layered system prompt assembly (§6 `context.ancestor_depth`): an agent's
//! effective system prompt is the concatenation of `AGENTS.md` files found
//! walking from the filesystem root down to its cwd, most general first,
//! followed by any explicit per-agent prompt.

use std::path::{Path, PathBuf};

const PROMPT_FILE: &str = "AGENTS.md";

#[derive(Clone, Debug)]
pub struct PromptLoader {
    pub ancestor_depth: u32,
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self { ancestor_depth: 2 }
    }
}

impl PromptLoader {
    pub fn new(ancestor_depth: u32) -> Self {
        Self { ancestor_depth: ancestor_depth.min(10) }
    }

    /// Builds the layered prompt for `cwd`, optionally appending `explicit`.
    /// Returns `None` if no ancestor file was found and no explicit prompt given.
    pub fn load(&self, cwd: &Path, explicit: Option<&str>) -> Option<String> {
        let layers = self.discover(cwd);
        if layers.is_empty() && explicit.is_none() {
            return None;
        }
        let mut combined = layers.join("\n\n");
        if let Some(extra) = explicit {
            if !combined.is_empty() {
                combined.push_str("\n\n");
            }
            combined.push_str(extra);
        }
        Some(combined)
    }

    /// Ancestor directories from the shallowest considered down to `cwd`,
    /// each contributing its `AGENTS.md` if present.
    fn discover(&self, cwd: &Path) -> Vec<String> {
        let ancestors: Vec<PathBuf> = cwd.ancestors().map(Path::to_path_buf).collect();
        let mut chain: Vec<PathBuf> = ancestors
            .into_iter()
            .take(self.ancestor_depth as usize + 1)
            .collect();
        chain.reverse();
        chain
            .into_iter()
            .filter_map(|dir| std::fs::read_to_string(dir.join(PROMPT_FILE)).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_with_no_files_and_no_explicit() {
        let dir = std::env::temp_dir().join("nexus3-prompt-test-empty");
        let _ = std::fs::create_dir_all(&dir);
        let loader = PromptLoader::new(0);
        assert!(loader.load(&dir, None).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reads_agents_md_in_cwd() {
        let dir = std::env::temp_dir().join("nexus3-prompt-test-cwd");
        let _ = std::fs::create_dir_all(&dir);
        std::fs::write(dir.join("AGENTS.md"), "be concise").unwrap();
        let loader = PromptLoader::new(0);
        let prompt = loader.load(&dir, None).unwrap();
        assert!(prompt.contains("be concise"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn appends_explicit_prompt_after_layers() {
        let dir = std::env::temp_dir().join("nexus3-prompt-test-explicit");
        let _ = std::fs::create_dir_all(&dir);
        std::fs::write(dir.join("AGENTS.md"), "layer one").unwrap();
        let loader = PromptLoader::new(0);
        let prompt = loader.load(&dir, Some("extra instructions")).unwrap();
        assert!(prompt.find("layer one").unwrap() < prompt.find("extra instructions").unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
