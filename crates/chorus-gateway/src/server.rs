//! Gateway HTTP server, Axum-based

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chorus_core::{FanOutReply, ProviderKind, Relay, SingleReply};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::protocol::{
    ChatRequest, ContinueRequest, ResetRequest, ResetResponse, SessionHistoryResponse,
    SessionListResponse, StatusResponse, resolve_session_id,
};
use crate::webchat;

/// Shared state for every request
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<Relay>,
    pub start_time: std::time::Instant,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            start_time: std::time::Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, relay: Arc<Relay>) -> Self {
        Self {
            state: GatewayState::new(relay),
            bind,
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `cancel` fires, then drain in-flight requests
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(webchat::index_handler))
        .route("/static/{*path}", get(webchat::static_handler))
        .route("/chat", post(chat_handler))
        .route("/continue", post(continue_handler))
        .route("/reset", post(reset_handler))
        .route("/history", get(sessions_handler))
        .route("/history/{session_id}", get(history_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── HTTP Handlers ──

async fn chat_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<FanOutReply>, ApiError> {
    let Json(req) = payload?;
    let session_id = resolve_session_id(req.session_id.as_deref());
    debug!("POST /chat session={}", session_id);

    let replies = state.relay.chat(session_id, &req.message).await?;
    Ok(Json(replies))
}

async fn continue_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<ContinueRequest>, JsonRejection>,
) -> Result<Json<SingleReply>, ApiError> {
    let Json(req) = payload?;
    let provider: ProviderKind = req.model.parse()?;
    let session_id = resolve_session_id(req.session_id.as_deref());
    debug!("POST /continue session={} model={}", session_id, provider);

    let reply = state
        .relay
        .continue_with(session_id, provider, &req.message)
        .await?;
    Ok(Json(reply))
}

async fn reset_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<Json<ResetResponse>, ApiError> {
    // An absent body resets the default session
    let req = match payload {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => ResetRequest::default(),
        Err(e) => return Err(e.into()),
    };
    let session_id = resolve_session_id(req.session_id.as_deref());

    state.relay.reset(session_id).await?;
    Ok(Json(ResetResponse::success()))
}

async fn sessions_handler(
    State(state): State<GatewayState>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state.relay.sessions().await?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn history_handler(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let histories = state.relay.history(&session_id).await?;
    Ok(Json(SessionHistoryResponse {
        session_id,
        histories,
    }))
}

async fn status_handler(State(state): State<GatewayState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        started_at: state.started_at,
        store: state.relay.store_backend().to_string(),
        providers: state.relay.providers(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::IntoResponse;
    use chorus_core::{ChatProvider, MissingSessionPolicy, ProviderSet, RelayConfig};
    use chorus_store::{ConversationStore, MemoryStore, Message, SqliteStore};
    use serde_json::Value;
    use tower::ServiceExt;

    struct SuccessProvider(&'static str);

    #[async_trait]
    impl ChatProvider for SuccessProvider {
        fn provider_name(&self) -> &str {
            self.0
        }
        fn model(&self) -> &str {
            "mock-1"
        }
        async fn chat(&self, messages: &[Message]) -> Result<String> {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("{} says {}", self.0, last))
        }
    }

    struct FailProvider;

    #[async_trait]
    impl ChatProvider for FailProvider {
        fn provider_name(&self) -> &str {
            "fail"
        }
        fn model(&self) -> &str {
            "fail-1"
        }
        async fn chat(&self, _messages: &[Message]) -> Result<String> {
            Err(anyhow!("API request failed with status 500: upstream down"))
        }
    }

    fn state_with(store: Arc<dyn ConversationStore>, config: RelayConfig) -> GatewayState {
        let providers = ProviderSet {
            openai: Arc::new(SuccessProvider("openai")),
            claude: Arc::new(FailProvider),
            gemini: Arc::new(SuccessProvider("gemini")),
        };
        GatewayState::new(Arc::new(Relay::new(store, providers, config)))
    }

    fn test_state() -> GatewayState {
        state_with(Arc::new(MemoryStore::new()), RelayConfig::default())
    }

    fn chat_body(
        message: &str,
        session_id: Option<&str>,
    ) -> Result<Json<ChatRequest>, JsonRejection> {
        Ok(Json(ChatRequest {
            message: message.to_string(),
            session_id: session_id.map(str::to_string),
        }))
    }

    #[tokio::test]
    async fn test_chat_returns_all_providers() {
        let state = test_state();
        let Json(replies) = chat_handler(State(state), chat_body("hi", Some("s1")))
            .await
            .unwrap();

        let body = serde_json::to_string(&replies).unwrap();
        assert!(body.starts_with(r#"{"openai":"openai says hi","claude":"Error: "#), "{}", body);

        let json = serde_json::to_value(&replies).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 3);
        assert!(json["claude"].as_str().unwrap().starts_with("Error: "));
        assert_eq!(json["gemini"], "gemini says hi");
    }

    #[tokio::test]
    async fn test_chat_defaults_session_id() {
        let state = test_state();
        let _replies = chat_handler(State(state.clone()), chat_body("hi", None))
            .await
            .unwrap();

        let Json(list) = sessions_handler(State(state)).await.unwrap();
        assert_eq!(list.sessions.len(), 1);
        assert_eq!(list.sessions[0].session_id, "default");
    }

    #[tokio::test]
    async fn test_chat_empty_message_is_bad_request() {
        let state = test_state();
        let err = chat_handler(State(state), chat_body("", Some("s1")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EMPTY_MESSAGE");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_continue_single_provider() {
        let state = test_state();
        let _replies = chat_handler(State(state.clone()), chat_body("hi", Some("s1")))
            .await
            .unwrap();

        let req = ContinueRequest {
            message: "tell me more".to_string(),
            model: "gemini".to_string(),
            session_id: Some("s1".to_string()),
        };
        let Json(reply) = continue_handler(State(state.clone()), Ok(Json(req)))
            .await
            .unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"response": "gemini says tell me more", "model": "gemini"})
        );

        let Json(history) = history_handler(State(state), Path("s1".to_string()))
            .await
            .unwrap();
        assert_eq!(history.histories[&ProviderKind::Gemini].len(), 4);
        assert_eq!(history.histories[&ProviderKind::OpenAi].len(), 2);
    }

    #[tokio::test]
    async fn test_continue_unknown_model_is_bad_request() {
        let state = test_state();
        let req = ContinueRequest {
            message: "hi".to_string(),
            model: "mistral".to_string(),
            session_id: None,
        };
        let err = continue_handler(State(state.clone()), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_PROVIDER");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        // Nothing was written
        let Json(list) = sessions_handler(State(state)).await.unwrap();
        assert!(list.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_continue_missing_session_rejected_is_not_found() {
        let config = RelayConfig {
            missing_session: MissingSessionPolicy::Reject,
            ..RelayConfig::default()
        };
        let state = state_with(Arc::new(MemoryStore::new()), config);
        let req = ContinueRequest {
            message: "hi".to_string(),
            model: "openai".to_string(),
            session_id: Some("ghost".to_string()),
        };
        let err = continue_handler(State(state), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let state = test_state();
        let _replies = chat_handler(State(state.clone()), chat_body("hi", Some("s1")))
            .await
            .unwrap();

        for _ in 0..2 {
            let req = ResetRequest {
                session_id: Some("s1".to_string()),
            };
            let Json(resp) = reset_handler(State(state.clone()), Ok(Json(req)))
                .await
                .unwrap();
            assert_eq!(resp.status, "success");
        }

        let Json(history) = history_handler(State(state), Path("s1".to_string()))
            .await
            .unwrap();
        assert!(history.histories.values().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn test_history_lists_sessions_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::new(dir.path().join("chorus.db")).unwrap());
        let state = state_with(store, RelayConfig::default());

        let _replies = chat_handler(State(state.clone()), chat_body("one", Some("older")))
            .await
            .unwrap();
        let _replies = chat_handler(State(state.clone()), chat_body("two", Some("newer")))
            .await
            .unwrap();

        let Json(list) = sessions_handler(State(state)).await.unwrap();
        let ids: Vec<&str> = list.sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, ["newer", "older"]);

        let json = serde_json::to_value(&list).unwrap();
        assert!(json["sessions"][0]["last_activity"].is_string());
    }

    #[tokio::test]
    async fn test_status_reports_backend_and_models() {
        let state = test_state();
        let Json(status) = status_handler(State(state)).await;
        assert_eq!(status.status, "ok");
        assert_eq!(status.store, "memory");
        assert_eq!(status.providers.len(), 3);
        assert_eq!(status.providers[0].provider, ProviderKind::OpenAi);
    }

    #[test]
    fn test_router_builds() {
        let server = GatewayServer::new("127.0.0.1:0".parse().unwrap(), test_state().relay);
        let _router = server.router();
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let server = GatewayServer::new("127.0.0.1:0".parse().unwrap(), test_state().relay);
        let cancel = CancellationToken::new();
        let handle = server.spawn(cancel.clone());

        cancel.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    // ── Through the router ──

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if body.is_some() {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        let req = req
            .body(Body::from(body.unwrap_or_default().to_string()))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_http_chat_returns_three_keys() {
        let app = router(test_state());
        let (status, json) =
            send(app, "POST", "/chat", Some(r#"{"message":"hi","session_id":"s1"}"#)).await;
        assert_eq!(status, StatusCode::OK);

        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["claude", "gemini", "openai"]);
        assert_eq!(json["openai"], "openai says hi");
    }

    #[tokio::test]
    async fn test_http_malformed_json_is_invalid_request() {
        let app = router(test_state());
        let (status, json) = send(app.clone(), "POST", "/chat", Some("{bad")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
        assert!(json["error"]["message"].is_string());

        // Wrong shape is rejected the same way
        let (status, json) = send(app, "POST", "/continue", Some(r#"{"message": 5}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_http_chat_without_body_is_invalid_request() {
        let app = router(test_state());
        let (status, json) = send(app, "POST", "/chat", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_http_reset_without_body_clears_default_session() {
        let state = test_state();
        let chat = Some(r#"{"message":"hi"}"#);
        let (status, _) = send(router(state.clone()), "POST", "/chat", chat).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = send(router(state.clone()), "POST", "/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "success"}));

        let (status, json) = send(router(state), "GET", "/history/default", None).await;
        assert_eq!(status, StatusCode::OK);
        for provider in ["openai", "claude", "gemini"] {
            assert_eq!(json["histories"][provider], serde_json::json!([]));
        }
    }

    #[tokio::test]
    async fn test_http_continue_unknown_model() {
        let app = router(test_state());
        let (status, json) = send(
            app,
            "POST",
            "/continue",
            Some(r#"{"message":"hi","model":"bard","session_id":"s1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "UNKNOWN_PROVIDER");
    }

    #[tokio::test]
    async fn test_http_history_routes() {
        let state = test_state();
        let body = r#"{"message":"hi","session_id":"abc-123"}"#;
        send(router(state.clone()), "POST", "/chat", Some(body)).await;

        let (status, json) = send(router(state.clone()), "GET", "/history/abc-123", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session_id"], "abc-123");
        assert_eq!(json["histories"]["gemini"].as_array().unwrap().len(), 2);
        assert_eq!(json["histories"]["gemini"][0]["role"], "user");

        let (status, json) = send(router(state.clone()), "GET", "/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessions"][0]["session_id"], "abc-123");

        let (status, json) = send(router(state), "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["store"], "memory");
    }

    #[tokio::test]
    async fn test_http_serves_web_ui() {
        let state = test_state();
        let resp = router(state.clone())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"), "{}", content_type);

        let resp = router(state)
            .oneshot(Request::get("/static/style.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/css");
    }
}
