//! HTTP + SSE Transport (§4.12): loopback-only JSON-RPC over HTTP, plus an
//! SSE feed per agent backed by the Event Hub.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::error_handling::HandleErrorLayer;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use nexus3_agent::AgentPool;
use nexus3_core::rpc::{RpcRequest, RpcResponse};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::auth::ServerAuth;
use crate::dispatch::{AgentDispatcher, GlobalDispatcher};
use crate::event_hub::EventHubRegistry;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_HEADER_BYTES: usize = 32 * 1024;
const MAX_HEADER_COUNT: usize = 128;
const MAX_HEADER_NAME_BYTES: usize = 1024;
const MAX_HEADER_VALUE_BYTES: usize = 8 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workspace_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8787, workspace_root: std::env::current_dir().unwrap_or_default() }
    }
}

#[derive(Clone)]
struct AppState {
    auth: Arc<ServerAuth>,
    global: Arc<GlobalDispatcher>,
    per_agent: Arc<AgentDispatcher>,
    event_hubs: Arc<EventHubRegistry>,
}

/// Resolves the bind address and rejects anything that isn't loopback (§4.12).
pub fn resolve_loopback_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = host.parse().map_err(|_| anyhow::anyhow!("host {host} does not resolve to a literal IP"))?;
    if !ip.is_loopback() {
        anyhow::bail!("refusing to bind non-loopback address {ip}: only 127.0.0.1 and ::1 are accepted");
    }
    Ok(SocketAddr::new(ip, port))
}

pub async fn start_server(config: ServerConfig, pool: Arc<AgentPool>, event_hubs: Arc<EventHubRegistry>) -> anyhow::Result<()> {
    let addr = resolve_loopback_addr(&config.host, config.port)?;
    let auth = Arc::new(ServerAuth::generate(config.port)?);
    info!(port = config.port, "server token written to {}", crate::auth::token_file_path(config.port).display());

    let base_url = format!("http://{addr}");
    let state = AppState {
        auth: auth.clone(),
        global: Arc::new(GlobalDispatcher::new(pool.clone(), base_url)),
        per_agent: Arc::new(AgentDispatcher::new(pool)),
        event_hubs,
    };

    let app = Router::new()
        .route("/", post(global_rpc_handler))
        .route("/rpc", post(global_rpc_handler))
        .route("/agent/:id", post(agent_rpc_handler))
        .route("/agent/:id/events", get(agent_events_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_: tower::BoxError| async { StatusCode::REQUEST_TIMEOUT }))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state);

    info!(%addr, "nexus3 server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn check_header_limits(headers: &HeaderMap) -> Result<(), Response> {
    if headers.len() > MAX_HEADER_COUNT {
        return Err((StatusCode::BAD_REQUEST, "too many headers").into_response());
    }
    let mut total = 0usize;
    for (name, value) in headers.iter() {
        if name.as_str().len() > MAX_HEADER_NAME_BYTES {
            return Err((StatusCode::BAD_REQUEST, "header name too long").into_response());
        }
        if value.as_bytes().len() > MAX_HEADER_VALUE_BYTES {
            return Err((StatusCode::BAD_REQUEST, "header value too long").into_response());
        }
        total += name.as_str().len() + value.as_bytes().len();
    }
    if total > MAX_HEADER_BYTES {
        return Err((StatusCode::BAD_REQUEST, "total header size too large").into_response());
    }
    Ok(())
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let header = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if state.auth.verify_header(header) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response())
    }
}

async fn global_rpc_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(r) = check_header_limits(&headers) {
        return r;
    }
    if let Err(r) = check_auth(&state, &headers) {
        return r;
    }
    handle_rpc_body(&body, |method, params| {
        let global = state.global.clone();
        let method = method.to_string();
        let params = params.clone();
        async move { global.dispatch(&method, &params).await }
    })
    .await
}

async fn agent_rpc_handler(
    State(state): State<AppState>,
    AxumPath(agent_id): AxumPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(r) = check_header_limits(&headers) {
        return r;
    }
    if let Err(r) = check_auth(&state, &headers) {
        return r;
    }
    handle_rpc_body(&body, |method, params| {
        let per_agent = state.per_agent.clone();
        let agent_id = agent_id.clone();
        let method = method.to_string();
        let params = params.clone();
        async move { per_agent.dispatch(&agent_id, &method, &params).await }
    })
    .await
}

async fn handle_rpc_body<F, Fut>(body: &[u8], dispatch: F) -> Response
where
    F: FnOnce(&str, &serde_json::Map<String, serde_json::Value>) -> Fut,
    Fut: std::future::Future<Output = nexus3_core::Result<serde_json::Value>>,
{
    let request: RpcRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(_) => return Json(RpcResponse::parse_error()).into_response(),
    };

    let params = match request.named_params() {
        Ok(p) => p,
        Err(e) => {
            if request.is_notification() {
                return StatusCode::NO_CONTENT.into_response();
            }
            return Json(RpcResponse::from_error(request.id.clone(), &e)).into_response();
        }
    };

    let result = dispatch(&request.method, params).await;

    if request.is_notification() {
        return StatusCode::NO_CONTENT.into_response();
    }

    match result {
        Ok(value) => Json(RpcResponse::ok(request.id, value)).into_response(),
        Err(e) => Json(RpcResponse::from_error(request.id, &e)).into_response(),
    }
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default)]
    since: u64,
}

async fn agent_events_handler(
    State(state): State<AppState>,
    AxumPath(agent_id): AxumPath<String>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(r) = check_header_limits(&headers) {
        return r;
    }
    if let Err(r) = check_auth(&state, &headers) {
        return r;
    }
    let Some(hub) = state.event_hubs.get(&agent_id) else {
        return (StatusCode::NOT_FOUND, "unknown agent").into_response();
    };

    let buffered = hub.buffered_since(query.since);
    let last_replayed = buffered.last().map(|e| e.seq);
    let live_rx = hub.subscribe_live();

    let replay = stream::iter(buffered.into_iter().map(sequenced_to_sse).map(Ok::<_, Infallible>));
    let live = tokio_stream::wrappers::BroadcastStream::new(live_rx).filter_map(move |item| {
        let last_replayed = last_replayed;
        async move {
            match item {
                Ok(event) if last_replayed.map(|s| event.seq > s).unwrap_or(true) => Some(Ok(sequenced_to_sse(event))),
                Ok(_) => None,
                Err(_) => None,
            }
        }
    });

    let combined: std::pin::Pin<Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send>> =
        Box::pin(replay.chain(live));

    Sse::new(combined).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")).into_response()
}

fn sequenced_to_sse(event: crate::event_hub::SequencedEvent) -> SseEvent {
    let kind = event_type_name(&event.event);
    SseEvent::default().id(event.seq.to_string()).event(kind).data(serde_json::to_string(&event).unwrap_or_default())
}

fn event_type_name(event: &nexus3_agent::TurnEvent) -> &'static str {
    use nexus3_agent::TurnEvent::*;
    match event {
        TurnStarted { .. } => "turn_started",
        ContentChunk { .. } => "content_chunk",
        ReasoningStarted { .. } => "reasoning_started",
        ReasoningEnded { .. } => "reasoning_ended",
        ToolDetected { .. } => "tool_detected",
        BatchStarted { .. } => "batch_started",
        ToolStarted { .. } => "tool_started",
        ToolCompleted { .. } => "tool_completed",
        BatchHalted { .. } => "batch_halted",
        BatchCompleted { .. } => "batch_completed",
        TurnCompleted { .. } => "turn_completed",
        TurnCancelled { .. } => "turn_cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_loopback_accepts_ipv4_loopback() {
        assert!(resolve_loopback_addr("127.0.0.1", 8787).is_ok());
    }

    #[test]
    fn resolve_loopback_accepts_ipv6_loopback() {
        assert!(resolve_loopback_addr("::1", 8787).is_ok());
    }

    #[test]
    fn resolve_loopback_rejects_lan_address() {
        assert!(resolve_loopback_addr("0.0.0.0", 8787).is_err());
        assert!(resolve_loopback_addr("192.168.1.5", 8787).is_err());
    }

    #[test]
    fn header_limits_reject_too_many_headers() {
        let mut headers = HeaderMap::new();
        for i in 0..(MAX_HEADER_COUNT + 1) {
            headers.insert(
                axum::http::HeaderName::from_bytes(format!("x-h{i}").as_bytes()).unwrap(),
                axum::http::HeaderValue::from_static("v"),
            );
        }
        assert!(check_header_limits(&headers).is_err());
    }

    #[test]
    fn header_limits_accept_small_header_set() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, axum::http::HeaderValue::from_static("Bearer x"));
        assert!(check_header_limits(&headers).is_ok());
    }
}
