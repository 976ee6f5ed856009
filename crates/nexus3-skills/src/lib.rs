//! Skills — modular tool implementations for the agent runtime.
//!
//! Each tool is a self-contained file in src/tools/.
//! To add a tool: create the file, implement the Tool trait, register below.
//! To remove a tool: delete the file, remove from tools/mod.rs and below.

pub mod registry;
pub mod tools;

pub use registry::{required_str, SkillServices, Tool, ToolRegistry};

/// Builds the registry with every built-in skill (§4.6). Permission gating
/// happens per-call via [`ToolRegistry::execute`] and [`ToolRegistry::get_definitions`],
/// not at registration time — all tools are always registered.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // --- Read-only tools ---
    registry.register(tools::read::ReadFileTool);
    registry.register(tools::glob::GlobTool);
    registry.register(tools::grep::GrepTool);

    // --- Mutation tools ---
    registry.register(tools::write::WriteFileTool);
    registry.register(tools::edit::EditFileTool);
    registry.register(tools::append::AppendFileTool);
    registry.register(tools::regex_replace::RegexReplaceTool);
    registry.register(tools::mkdir::MkdirTool);
    registry.register(tools::copy_file::CopyFileTool);
    registry.register(tools::rename::RenameTool);
    registry.register(tools::patch::PatchTool);

    // --- Subprocess execution ---
    registry.register(tools::bash::BashTool);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_twelve_tools() {
        let registry = create_default_registry();
        assert_eq!(registry.list().len(), 12);
    }

    #[test]
    fn read_only_tools_are_marked() {
        let registry = create_default_registry();
        let read_only = registry.list_read_only();
        assert!(read_only.contains(&"read_file"));
        assert!(read_only.contains(&"glob"));
        assert!(read_only.contains(&"grep"));
        assert!(!read_only.contains(&"bash"));
    }
}
