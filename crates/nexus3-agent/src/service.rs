//! Service Container (§4.5): the per-agent typed registry every turn reads
//! from. Accessors are read-only; mutation goes through the owning agent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nexus3_permissions::AgentPermissions;
use nexus3_skills::ToolRegistry;
use tokio::sync::RwLock;

use crate::confirm::ConfirmationCallback;
use crate::events::EventSink;

/// Placeholder for the optional clipboard/IDE bridges (§6's `clipboard.*`,
/// `ide.*` config options). Neither has a concrete transport in this
/// implementation; the fields exist so the container's shape matches §4.5
/// and a later IDE integration has somewhere to plug in.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClipboardBridge;

#[derive(Clone, Copy, Debug, Default)]
pub struct IdeBridge;

pub struct ServiceContainer {
    pub permissions: RwLock<AgentPermissions>,
    pub cwd: PathBuf,
    pub logger: tracing::Span,
    pub event_hub: Arc<dyn EventSink>,
    pub skills: Arc<ToolRegistry>,
    pub confirm: Arc<dyn ConfirmationCallback>,
    pub clipboard: ClipboardBridge,
    pub ide_bridge: Option<IdeBridge>,
}

impl ServiceContainer {
    pub fn new(
        permissions: AgentPermissions,
        cwd: impl Into<PathBuf>,
        logger: tracing::Span,
        event_hub: Arc<dyn EventSink>,
        skills: Arc<ToolRegistry>,
        confirm: Arc<dyn ConfirmationCallback>,
    ) -> Self {
        Self {
            permissions: RwLock::new(permissions),
            cwd: cwd.into(),
            logger,
            event_hub,
            skills,
            confirm,
            clipboard: ClipboardBridge,
            ide_bridge: None,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}
