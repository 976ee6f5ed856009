//! Agent (§3, §4.10): the stateful unit bundling context, skills,
//! permissions, and a turn executor, addressed by id.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nexus3_context::ContextManager;
use nexus3_core::CancelToken;
use nexus3_permissions::AgentPermissions;
use tokio::sync::Mutex;

use crate::service::ServiceContainer;
use crate::session::{self, SessionSnapshot};
use crate::turn::{TurnExecutor, TurnOutcome};

/// `invalid_params("busy")` per §5: a single agent processes at most one
/// active turn at a time.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("busy")]
    Busy,
}

pub struct AgentSummary {
    pub id: String,
    pub created_at: String,
    pub message_count: usize,
    pub should_shutdown: bool,
}

pub struct Agent {
    pub id: String,
    pub created_at: String,
    pub cwd: PathBuf,
    context: Mutex<ContextManager>,
    permissions: Mutex<AgentPermissions>,
    services: Arc<ServiceContainer>,
    executor: TurnExecutor,
    repl_connected: AtomicBool,
    should_shutdown: AtomicBool,
    /// The request_id bound to the in-progress turn's cancellation token
    /// (spec.md:333: "the dispatcher's `active_requests` map is keyed by
    /// `request_id`" — here collapsed to this agent's single active slot).
    active_cancel: Mutex<Option<(String, CancelToken)>>,
    session_name: Option<String>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        created_at: impl Into<String>,
        cwd: PathBuf,
        context: ContextManager,
        permissions: AgentPermissions,
        services: Arc<ServiceContainer>,
        executor: TurnExecutor,
        session_name: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            cwd,
            context: Mutex::new(context),
            permissions: Mutex::new(permissions),
            services,
            executor,
            repl_connected: AtomicBool::new(false),
            should_shutdown: AtomicBool::new(false),
            active_cancel: Mutex::new(None),
            session_name,
        }
    }

    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    pub fn repl_connected(&self) -> bool {
        self.repl_connected.load(Ordering::SeqCst)
    }

    pub fn set_repl_connected(&self, connected: bool) {
        self.repl_connected.store(connected, Ordering::SeqCst);
    }

    pub fn should_shutdown(&self) -> bool {
        self.should_shutdown.load(Ordering::SeqCst)
    }

    pub fn mark_shutdown(&self) {
        self.should_shutdown.store(true, Ordering::SeqCst);
    }

    pub async fn message_count(&self) -> usize {
        self.context.lock().await.messages().len()
    }

    pub async fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id.clone(),
            created_at: self.created_at.clone(),
            message_count: self.message_count().await,
            should_shutdown: self.should_shutdown(),
        }
    }

    pub async fn token_usage(&self) -> nexus3_context::TokenUsage {
        self.context.lock().await.token_usage()
    }

    pub async fn context_summary(&self) -> (usize, bool) {
        let ctx = self.context.lock().await;
        (ctx.messages().len(), ctx.rendered_system_prompt().is_some())
    }

    pub async fn permissions_level_is_yolo(&self) -> bool {
        self.permissions.lock().await.policy.level == nexus3_permissions::PermissionLevel::Yolo
    }

    /// Lets the dispatcher wire tool overrides onto a newly created agent
    /// without exposing the permissions lock directly (§4.11).
    pub async fn with_permissions_mut<F: FnOnce(&mut AgentPermissions)>(&self, f: F) {
        let mut permissions = self.permissions.lock().await;
        f(&mut permissions);
    }

    /// Runs one turn. Rejects with [`SendError::Busy`] if a turn is already
    /// in progress on this agent.
    pub async fn send(&self, content: &str, request_id: &str) -> Result<TurnOutcome, SendError> {
        {
            let mut active = self.active_cancel.lock().await;
            if active.is_some() {
                return Err(SendError::Busy);
            }
            *active = Some((request_id.to_string(), CancelToken::new()));
        }
        let cancel = self.active_cancel.lock().await.as_ref().expect("just set").1.clone();

        let mut context = self.context.lock().await;
        let mut permissions = self.permissions.lock().await;
        let outcome = self
            .executor
            .run_turn(&mut context, &self.cwd, &mut permissions, content, request_id, cancel)
            .await;

        if let Some(name) = &self.session_name {
            let now = chrono::Utc::now().to_rfc3339();
            let snap = session::snapshot(
                name.clone(),
                self.created_at.clone(),
                now,
                context.rendered_system_prompt(),
                context.messages().to_vec(),
            );
            if let Err(e) = session::save(&snap) {
                tracing::warn!(agent_id = %self.id, error = %e, "failed to persist session");
            }
        }

        *self.active_cancel.lock().await = None;
        Ok(outcome)
    }

    /// Cancels the in-progress request if `request_id` matches it. Returns
    /// `false` for a stale or unrelated id, or if there is nothing in flight
    /// (§5: cancel is idempotent).
    pub async fn cancel(&self, request_id: &str) -> bool {
        let active = self.active_cancel.lock().await;
        match active.as_ref() {
            Some((active_id, token)) if active_id.as_str() == request_id => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancels whatever turn is in flight regardless of `request_id`, used
    /// when tearing an agent down entirely (pool destroy/shutdown).
    pub async fn cancel_any(&self) -> bool {
        let active = self.active_cancel.lock().await;
        match active.as_ref() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Saves a snapshot of the current context under `name`, without running a turn.
    pub async fn save_session(&self, name: &str) -> Result<(), session::SessionError> {
        let context = self.context.lock().await;
        let now = chrono::Utc::now().to_rfc3339();
        let snap = session::snapshot(
            name,
            self.created_at.clone(),
            now,
            context.rendered_system_prompt(),
            context.messages().to_vec(),
        );
        session::save(&snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AllowAll;
    use crate::events::NullSink;
    use crate::turn::TurnConfig;
    use nexus3_context::FallbackTokenCounter;
    use nexus3_llm::{MockProvider, MockTurn};
    use nexus3_permissions::resolve_preset;
    use nexus3_skills::create_default_registry;

    fn test_agent() -> Agent {
        let dir = std::env::temp_dir();
        let permissions = resolve_preset("yolo", &dir).unwrap();
        let context = ContextManager::new(Box::new(FallbackTokenCounter), 100_000, 0);
        let registry = Arc::new(create_default_registry());
        let services = Arc::new(ServiceContainer::new(
            permissions.clone(),
            dir.clone(),
            tracing::Span::none(),
            Arc::new(NullSink),
            registry.clone(),
            Arc::new(AllowAll),
        ));
        let provider = Arc::new(MockProvider::new(vec![MockTurn::Text("hi".to_string())]));
        let executor = TurnExecutor::new(
            provider,
            registry,
            Arc::new(AllowAll),
            Arc::new(NullSink),
            TurnConfig {
                model: "mock-1".to_string(),
                ..Default::default()
            },
        );
        Agent::new("a1", "2026-01-01T00:00:00Z", dir, context, permissions, services, executor, None)
    }

    #[tokio::test]
    async fn send_completes_and_updates_message_count() {
        let agent = test_agent();
        let outcome = agent.send("hello", "r1").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(agent.message_count().await, 2);
    }

    #[tokio::test]
    async fn cancel_without_active_turn_returns_false() {
        let agent = test_agent();
        assert!(!agent.cancel("anything").await);
        assert!(!agent.cancel_any().await);
    }

    #[tokio::test]
    async fn cancel_rejects_mismatched_request_id() {
        let agent = Arc::new(test_agent());
        let a = agent.clone();
        let handle = tokio::spawn(async move { a.send("hello", "r1").await });
        tokio::task::yield_now().await;
        assert!(!agent.cancel("wrong-id").await);
        let _ = handle.await;
    }

    #[test]
    fn repl_connected_defaults_false() {
        let agent = test_agent();
        assert!(!agent.repl_connected());
    }
}
