//! Confirmation callback (§4.9): invoked when the policy requires
//! out-of-band approval for a destructive action mid-turn.

use nexus3_permissions::{Action, ConfirmDecision};

#[async_trait::async_trait]
pub trait ConfirmationCallback: Send + Sync {
    async fn ask(&self, action: Action, subject: &str) -> ConfirmDecision;
}

/// No REPL connected: every destructive action is denied by default, per
/// §4.9's rule for RPC-driven agents.
pub struct DenyAll;

#[async_trait::async_trait]
impl ConfirmationCallback for DenyAll {
    async fn ask(&self, _action: Action, _subject: &str) -> ConfirmDecision {
        ConfirmDecision::Deny
    }
}

/// Grants every request. Useful for YOLO agents and tests.
pub struct AllowAll;

#[async_trait::async_trait]
impl ConfirmationCallback for AllowAll {
    async fn ask(&self, _action: Action, _subject: &str) -> ConfirmDecision {
        ConfirmDecision::Once
    }
}
