//! Agent Pool (§4.10): creates, looks up, and tears down agents. Shared
//! immutable components (provider, prompt loader, base log dir) are frozen
//! once the pool is constructed and referenced by every agent's service graph.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use nexus3_context::{ContextManager, FallbackTokenCounter};
use nexus3_core::AgentId;
use nexus3_llm::LlmProvider;
use nexus3_permissions::{resolve_preset, AgentPermissions};
use nexus3_skills::{create_default_registry, ToolRegistry};
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

use crate::agent::{Agent, AgentSummary};
use crate::confirm::{ConfirmationCallback, DenyAll};
use crate::events::{EventSink, NullSink};
use crate::prompt::PromptLoader;
use crate::service::ServiceContainer;
use crate::turn::{TurnConfig, TurnExecutor};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid agent id: {0}")]
    InvalidId(String),
    #[error("duplicate agent id: {0}")]
    Duplicate(String),
    #[error("unknown agent id: {0}")]
    NotFound(String),
    #[error(transparent)]
    Permission(#[from] nexus3_core::Error),
}

/// Per-agent creation options. `preset` defaults to `"sandboxed"`.
#[derive(Clone, Debug, Default)]
pub struct CreateAgentConfig {
    pub preset: Option<String>,
    pub system_prompt: Option<String>,
    pub cwd: Option<PathBuf>,
    pub model: Option<String>,
}

/// Components frozen at pool construction and shared by every agent created
/// from it.
pub struct PoolComponents {
    pub provider: Arc<dyn LlmProvider>,
    pub prompt_loader: PromptLoader,
    pub base_log_dir: PathBuf,
    pub event_hub_factory: Arc<dyn Fn(&str) -> Arc<dyn EventSink> + Send + Sync>,
    pub confirm_factory: Arc<dyn Fn(&str) -> Arc<dyn ConfirmationCallback> + Send + Sync>,
}

impl PoolComponents {
    pub fn new(provider: Arc<dyn LlmProvider>, base_log_dir: PathBuf) -> Self {
        Self {
            provider,
            prompt_loader: PromptLoader::default(),
            base_log_dir,
            event_hub_factory: Arc::new(|_id| Arc::new(NullSink) as Arc<dyn EventSink>),
            confirm_factory: Arc::new(|_id| Arc::new(DenyAll) as Arc<dyn ConfirmationCallback>),
        }
    }
}

pub struct AgentPool {
    agents: DashMap<String, Arc<Agent>>,
    components: PoolComponents,
    /// Serializes create/destroy/create_temp so id generation and
    /// duplicate-detection never race (§4.10).
    lock: tokio::sync::Mutex<()>,
    _log_guards: DashMap<String, WorkerGuard>,
}

impl AgentPool {
    pub fn new(components: PoolComponents) -> Self {
        Self {
            agents: DashMap::new(),
            components,
            lock: tokio::sync::Mutex::new(()),
            _log_guards: DashMap::new(),
        }
    }

    pub async fn create(&self, id: Option<&str>, config: CreateAgentConfig) -> Result<Arc<Agent>, PoolError> {
        let _guard = self.lock.lock().await;
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        AgentId::parse(id.clone()).map_err(PoolError::InvalidId)?;
        if self.agents.contains_key(&id) {
            return Err(PoolError::Duplicate(id));
        }
        let agent = self.build_agent(&id, config)?;
        self.agents.insert(id, agent.clone());
        Ok(agent)
    }

    /// Allocates a fresh id and creates the agent atomically (§4.10).
    pub async fn create_temp(&self) -> Result<Arc<Agent>, PoolError> {
        let _guard = self.lock.lock().await;
        loop {
            let id = format!("tmp-{}", Uuid::new_v4().simple());
            if !self.agents.contains_key(&id) {
                let agent = self.build_agent(&id, CreateAgentConfig::default())?;
                self.agents.insert(id, agent.clone());
                return Ok(agent);
            }
        }
    }

    fn build_agent(&self, id: &str, config: CreateAgentConfig) -> Result<Arc<Agent>, PoolError> {
        let cwd = config.cwd.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let preset = config.preset.as_deref().unwrap_or("sandboxed");
        let permissions = resolve_preset(preset, &cwd)?;

        let mut context = ContextManager::new(Box::new(FallbackTokenCounter), 180_000, 8_000);
        let prompt = self.components.prompt_loader.load(&cwd, config.system_prompt.as_deref());
        if let Some(p) = prompt {
            context.set_system_prompt(p);
        }

        let registry: Arc<ToolRegistry> = Arc::new(create_default_registry());
        let event_hub = (self.components.event_hub_factory)(id);
        let confirm = (self.components.confirm_factory)(id);
        let logger = tracing::info_span!("agent", agent_id = %id);

        let appender = tracing_appender::rolling::never(&self.components.base_log_dir, format!("{id}.log"));
        let (_writer, guard) = tracing_appender::non_blocking(appender);
        self._log_guards.insert(id.to_string(), guard);

        let services = Arc::new(ServiceContainer::new(
            permissions.clone(),
            cwd.clone(),
            logger,
            event_hub.clone(),
            registry.clone(),
            confirm.clone(),
        ));

        let executor = TurnExecutor::new(
            self.components.provider.clone(),
            registry,
            confirm,
            event_hub,
            TurnConfig {
                model: config.model.unwrap_or_else(default_model),
                ..Default::default()
            },
        );

        let created_at = chrono::Utc::now().to_rfc3339();
        Ok(Arc::new(Agent::new(
            id, created_at, cwd, context, permissions, services, executor, None,
        )))
    }

    /// Removes the agent, cancelling any in-progress turn. Returns `false`
    /// if no agent with this id exists.
    pub async fn destroy(&self, id: &str) -> bool {
        let _guard = self.lock.lock().await;
        match self.agents.remove(id) {
            Some((_, agent)) => {
                agent.cancel_any().await;
                agent.mark_shutdown();
                self._log_guards.remove(id);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.get(id).map(|e| e.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub async fn list(&self) -> Vec<AgentSummary> {
        let mut summaries = Vec::with_capacity(self.agents.len());
        for entry in self.agents.iter() {
            summaries.push(entry.value().summary().await);
        }
        summaries
    }

    pub fn set_repl_connected(&self, id: &str, connected: bool) -> bool {
        match self.agents.get(id) {
            Some(agent) => {
                agent.set_repl_connected(connected);
                true
            }
            None => false,
        }
    }

    /// Drains the pool: cancels every in-progress turn, waits briefly, and
    /// clears the registry. Loggers are dropped with their worker guards.
    pub async fn shutdown(&self) {
        let _guard = self.lock.lock().await;
        for entry in self.agents.iter() {
            entry.value().cancel_any().await;
            entry.value().mark_shutdown();
        }
        self.agents.clear();
        self._log_guards.clear();
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_llm::MockProvider;

    fn pool() -> AgentPool {
        let provider = Arc::new(MockProvider::echo());
        let components = PoolComponents::new(provider, std::env::temp_dir());
        AgentPool::new(components)
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let pool = pool();
        pool.create(Some("a1"), CreateAgentConfig::default()).await.unwrap();
        let err = pool.create(Some("a1"), CreateAgentConfig::default()).await;
        assert!(matches!(err, Err(PoolError::Duplicate(_))));
    }

    #[tokio::test]
    async fn create_temp_allocates_unique_ids() {
        let pool = pool();
        let a = pool.create_temp().await.unwrap();
        let b = pool.create_temp().await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn destroy_removes_agent() {
        let pool = pool();
        pool.create(Some("a1"), CreateAgentConfig::default()).await.unwrap();
        assert!(pool.destroy("a1").await);
        assert!(!pool.contains("a1"));
        assert!(!pool.destroy("a1").await);
    }

    #[tokio::test]
    async fn list_reports_summaries() {
        let pool = pool();
        pool.create(Some("a1"), CreateAgentConfig::default()).await.unwrap();
        let summaries = pool.list().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "a1");
    }

    #[tokio::test]
    async fn set_repl_connected_toggles_flag() {
        let pool = pool();
        let agent = pool.create(Some("a1"), CreateAgentConfig::default()).await.unwrap();
        assert!(!agent.repl_connected());
        assert!(pool.set_repl_connected("a1", true));
        assert!(agent.repl_connected());
    }
}
