//! RPC Dispatcher (§4.11): a global dispatcher for pool operations and a
//! per-agent dispatcher for agent operations, both speaking named-params
//! JSON-RPC 2.0. Security rules (YOLO refusal, sandbox write-path
//! containment) are enforced here, at the boundary, not inside the agent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nexus3_agent::{AgentPool, CreateAgentConfig, PoolError, SendError};
use nexus3_core::{Error, Result};
use nexus3_permissions::WRITE_CAPABLE_TOOLS;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use serde_json::{json, Value};

fn random_request_id() -> String {
    let mut bytes = [0u8; 16];
    // A fresh SystemRandom per call is deliberately cheap here; request-id
    // generation is not a hot path.
    let _ = SystemRandom::new().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct CreateAgentParams {
    agent_id: Option<String>,
    preset: Option<String>,
    system_prompt: Option<String>,
    cwd: Option<String>,
    #[serde(default)]
    write_paths: Vec<String>,
    #[serde(default)]
    disable_tools: Vec<String>,
    model: Option<String>,
}

pub struct GlobalDispatcher {
    pool: Arc<AgentPool>,
    base_url: String,
}

impl GlobalDispatcher {
    pub fn new(pool: Arc<AgentPool>, base_url: impl Into<String>) -> Self {
        Self { pool, base_url: base_url.into() }
    }

    pub async fn dispatch(&self, method: &str, params: &serde_json::Map<String, Value>) -> Result<Value> {
        match method {
            "create_agent" => self.create_agent(params).await,
            "destroy_agent" => self.destroy_agent(params).await,
            "list_agents" => self.list_agents().await,
            "shutdown_server" => self.shutdown_server().await,
            other => Err(Error::InvalidParams(format!("unknown method: {other}"))),
        }
    }

    async fn create_agent(&self, params: &serde_json::Map<String, Value>) -> Result<Value> {
        let params: CreateAgentParams =
            serde_json::from_value(Value::Object(params.clone())).map_err(|e| Error::InvalidParams(e.to_string()))?;

        let preset = params.preset.clone().unwrap_or_else(|| "sandboxed".to_string());
        if preset == "yolo" {
            return Err(Error::InvalidParams(
                "YOLO preset is not creatable over RPC; only a locally connected REPL may create a YOLO agent"
                    .to_string(),
            ));
        }

        let cwd = params.cwd.map(PathBuf::from).unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

        if preset == "sandboxed" {
            for write_path in &params.write_paths {
                if !is_descendant(Path::new(write_path), &cwd) {
                    return Err(Error::InvalidParams(format!(
                        "write_path {write_path} is not a descendant of cwd {}",
                        cwd.display()
                    )));
                }
            }
        }

        let is_sandboxed = preset == "sandboxed";
        let config = CreateAgentConfig {
            preset: Some(preset),
            system_prompt: params.system_prompt,
            cwd: Some(cwd),
            model: params.model,
        };

        let agent = self
            .pool
            .create(params.agent_id.as_deref(), config)
            .await
            .map_err(pool_error_to_core)?;

        // §4.11: the write_paths wiring rule applies only to sandboxed/worker
        // agents; trusted/yolo keep resolve_preset's own allowed_paths as-is.
        if is_sandboxed {
            apply_write_path_policy(&agent, &params.write_paths).await;
        }
        if !params.disable_tools.is_empty() {
            apply_disabled_tools(&agent, &params.disable_tools).await;
        }

        Ok(json!({
            "agent_id": agent.id,
            "url": format!("{}/agent/{}", self.base_url, agent.id),
        }))
    }

    async fn destroy_agent(&self, params: &serde_json::Map<String, Value>) -> Result<Value> {
        let agent_id = required_str(params, "agent_id")?;
        let success = self.pool.destroy(agent_id).await;
        Ok(json!({ "success": success, "agent_id": agent_id }))
    }

    async fn list_agents(&self) -> Result<Value> {
        let agents: Vec<Value> = self
            .pool
            .list()
            .await
            .into_iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "created_at": s.created_at,
                    "message_count": s.message_count,
                    "should_shutdown": s.should_shutdown,
                })
            })
            .collect();
        Ok(json!({ "agents": agents }))
    }

    async fn shutdown_server(&self) -> Result<Value> {
        self.pool.shutdown().await;
        Ok(json!({ "success": true }))
    }
}

pub struct AgentDispatcher {
    pool: Arc<AgentPool>,
}

impl AgentDispatcher {
    pub fn new(pool: Arc<AgentPool>) -> Self {
        Self { pool }
    }

    pub async fn dispatch(&self, agent_id: &str, method: &str, params: &serde_json::Map<String, Value>) -> Result<Value> {
        let agent = self
            .pool
            .get(agent_id)
            .ok_or_else(|| Error::InvalidParams(format!("unknown agent: {agent_id}")))?;

        match method {
            "send" => {
                let content = params
                    .get("content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::InvalidParams("content must be a string".to_string()))?;
                if agent.permissions_level_is_yolo().await && !agent.repl_connected() {
                    return Err(Error::InvalidParams("no REPL connected".to_string()));
                }
                let request_id = params
                    .get("request_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(random_request_id);

                let outcome = agent.send(content, &request_id).await.map_err(|e| match e {
                    SendError::Busy => Error::InvalidParams("busy".to_string()),
                })?;

                Ok(outcome_to_json(outcome, &request_id))
            }
            "cancel" => {
                let request_id = required_str(params, "request_id")?;
                let cancelled = agent.cancel(request_id).await;
                Ok(json!({ "cancelled": cancelled, "request_id": request_id }))
            }
            "get_tokens" => {
                let usage = agent.token_usage().await;
                Ok(serde_json::to_value(usage).map_err(Error::Json)?)
            }
            "get_context" => {
                let (message_count, system_prompt_present) = agent.context_summary().await;
                Ok(json!({ "message_count": message_count, "system_prompt_present": system_prompt_present }))
            }
            "shutdown" => {
                agent.mark_shutdown();
                Ok(json!({ "success": true }))
            }
            other => Err(Error::InvalidParams(format!("unknown method: {other}"))),
        }
    }
}

fn outcome_to_json(outcome: nexus3_agent::TurnOutcome, request_id: &str) -> Value {
    match outcome {
        nexus3_agent::TurnOutcome::Completed { content } => {
            json!({ "content": content, "cancelled": false, "request_id": request_id })
        }
        nexus3_agent::TurnOutcome::Cancelled { partial_content } => {
            json!({ "content": partial_content, "cancelled": true, "request_id": request_id })
        }
        nexus3_agent::TurnOutcome::Failed { message } => {
            json!({ "content": "", "cancelled": false, "request_id": request_id, "error": message })
        }
    }
}

fn required_str<'a>(params: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidParams(format!("missing required param: {key}")))
}

fn is_descendant(candidate: &Path, root: &Path) -> bool {
    let candidate = candidate.canonicalize().unwrap_or_else(|_| candidate.to_path_buf());
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    candidate.starts_with(root)
}

fn pool_error_to_core(e: PoolError) -> Error {
    match e {
        PoolError::InvalidId(id) => Error::InvalidParams(format!("invalid agent id: {id}")),
        PoolError::Duplicate(id) => Error::InvalidParams(format!("duplicate agent id: {id}")),
        PoolError::NotFound(id) => Error::InvalidParams(format!("unknown agent id: {id}")),
        PoolError::Permission(inner) => inner,
    }
}

/// §4.11: for sandboxed/worker agents, nonempty `write_paths` enable the
/// write-capable tools scoped to those paths; empty `write_paths` disable
/// all of them. Callers must only invoke this for preset ∈ {sandboxed,
/// worker} — trusted/yolo agents keep `resolve_preset`'s own
/// `allowed_paths` untouched.
async fn apply_write_path_policy(agent: &nexus3_agent::Agent, write_paths: &[String]) {
    agent
        .with_permissions_mut(|permissions| {
            if !write_paths.is_empty() {
                let paths: Vec<PathBuf> = write_paths.iter().map(PathBuf::from).collect();
                for tool in WRITE_CAPABLE_TOOLS {
                    permissions.policy.tool_overrides.insert(
                        (*tool).to_string(),
                        nexus3_permissions::ToolOverride { allowed_paths: Some(paths.clone()) },
                    );
                }
            } else {
                for tool in WRITE_CAPABLE_TOOLS {
                    permissions.policy.tool_overrides.insert(
                        (*tool).to_string(),
                        nexus3_permissions::ToolOverride { allowed_paths: Some(vec![]) },
                    );
                }
            }
        })
        .await;
}

async fn apply_disabled_tools(agent: &nexus3_agent::Agent, disable_tools: &[String]) {
    agent
        .with_permissions_mut(|permissions| {
            for tool in disable_tools {
                permissions.policy.disabled_tools.insert(tool.clone());
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_agent::PoolComponents;
    use nexus3_llm::MockProvider;

    fn pool() -> Arc<AgentPool> {
        let provider = Arc::new(MockProvider::echo());
        let components = PoolComponents::new(provider, std::env::temp_dir());
        Arc::new(AgentPool::new(components))
    }

    fn obj(v: Value) -> serde_json::Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn create_agent_rejects_yolo() {
        let dispatcher = GlobalDispatcher::new(pool(), "http://127.0.0.1:8787");
        let err = dispatcher.create_agent(&obj(json!({"preset": "yolo"}))).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn create_agent_rejects_write_path_outside_cwd() {
        let dispatcher = GlobalDispatcher::new(pool(), "http://127.0.0.1:8787");
        let cwd = std::env::temp_dir();
        let err = dispatcher
            .create_agent(&obj(json!({
                "preset": "sandboxed",
                "cwd": cwd.to_string_lossy(),
                "write_paths": ["/this/does/not/descend"],
            })))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn create_agent_then_destroy_then_recreate_succeeds() {
        let pool = pool();
        let dispatcher = GlobalDispatcher::new(pool.clone(), "http://127.0.0.1:8787");
        dispatcher.create_agent(&obj(json!({"agent_id": "a1"}))).await.unwrap();
        dispatcher.destroy_agent(&obj(json!({"agent_id": "a1"}))).await.unwrap();
        let result = dispatcher.create_agent(&obj(json!({"agent_id": "a1"}))).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn create_agent_trusted_keeps_write_tools_unrestricted() {
        let pool = pool();
        let dispatcher = GlobalDispatcher::new(pool.clone(), "http://127.0.0.1:8787");
        dispatcher.create_agent(&obj(json!({"agent_id": "a1", "preset": "trusted"}))).await.unwrap();
        let agent = pool.get("a1").unwrap();
        let mut has_override = false;
        agent
            .with_permissions_mut(|permissions| {
                has_override = permissions.policy.tool_overrides.contains_key("write_file");
            })
            .await;
        assert!(!has_override);
    }

    #[tokio::test]
    async fn list_agents_reports_created_agents() {
        let pool = pool();
        let dispatcher = GlobalDispatcher::new(pool.clone(), "http://127.0.0.1:8787");
        dispatcher.create_agent(&obj(json!({"agent_id": "a1"}))).await.unwrap();
        let result = dispatcher.list_agents().await.unwrap();
        assert_eq!(result["agents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn agent_dispatcher_send_then_cancel_not_found() {
        let pool = pool();
        let global = GlobalDispatcher::new(pool.clone(), "http://127.0.0.1:8787");
        global.create_agent(&obj(json!({"agent_id": "a1"}))).await.unwrap();
        let per_agent = AgentDispatcher::new(pool);
        let result = per_agent.dispatch("a1", "send", &obj(json!({"content": "hi"}))).await.unwrap();
        assert_eq!(result["cancelled"], false);
        let cancel = per_agent.dispatch("a1", "cancel", &obj(json!({"request_id": "done-already"}))).await.unwrap();
        assert_eq!(cancel["cancelled"], false);
    }
}
