//! Permission model, obfuscation-resistant bash classification, and the
//! path sandbox (§4.3, §4.4).

pub mod bash;
pub mod policy;
pub mod sandbox;

pub use bash::{detect_obfuscation, normalize_command_name};
pub use policy::{
    apply_delta, resolve_preset, Action, AgentPermissions, ConfirmDecision, PermissionDelta,
    PermissionLevel, PermissionPolicy, SessionAllowances, ToolOverride, WRITE_CAPABLE_TOOLS,
};
pub use sandbox::{refuse_symlink_write, resolve_path, ResolveOptions};
