//! HTTP channel: `POST /chat` answered with a server-sent event stream.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agent_kernel::{
    Channel, ChannelError, ChannelLifecycle, ChannelResult, LifecycleEvent, MessageBus,
    sender_allowed,
};
use agent_primitives::{InboundMessage, OutboundMessage, RequestId, SessionId};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::json;
use crate::router::SessionRouter;
use crate::stream::{DEFAULT_STREAM_TIMEOUT, event_stream};

/// Name under which the channel registers and publishes.
pub const CHANNEL_NAME: &str = "http";

/// Sender id stamped on every inbound message.
pub const SENDER_ID: &str = "desktop";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 18790;

/// Listener and stream settings for [`HttpChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpChannelConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Sender ids allowed to chat. Empty allows everyone.
    pub allow_from: Vec<String>,
    /// Inactivity deadline for one response stream.
    pub stream_timeout: Duration,
}

impl Default for HttpChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            allow_from: Vec::new(),
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

impl HttpChannelConfig {
    /// `host:port` as written in logs and errors.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Channel serving one streamed HTTP response per chat turn.
pub struct HttpChannel {
    config: HttpChannelConfig,
    bus: Arc<MessageBus>,
    router: Arc<SessionRouter>,
    lifecycle: Mutex<ChannelLifecycle>,
    shutdown: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpChannel {
    /// Creates a stopped channel publishing onto `bus`.
    #[must_use]
    pub fn new(config: HttpChannelConfig, bus: Arc<MessageBus>) -> Self {
        Self::with_router(config, bus, Arc::new(SessionRouter::new()))
    }

    /// Creates a stopped channel using an existing session router.
    #[must_use]
    pub fn with_router(
        config: HttpChannelConfig,
        bus: Arc<MessageBus>,
        router: Arc<SessionRouter>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            bus,
            router,
            lifecycle: Mutex::new(ChannelLifecycle::new(CHANNEL_NAME)),
            shutdown,
            local_addr: Mutex::new(None),
        }
    }

    /// Channel settings.
    #[must_use]
    pub fn config(&self) -> &HttpChannelConfig {
        &self.config
    }

    /// Session router backing the response streams.
    #[must_use]
    pub fn router(&self) -> &Arc<SessionRouter> {
        &self.router
    }

    /// Address actually bound by the last successful [`Channel::start`].
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds the HTTP application without binding a listener.
    #[must_use]
    pub fn app(&self) -> Router {
        app(ChatState {
            router: Arc::clone(&self.router),
            bus: Arc::clone(&self.bus),
            stream_timeout: self.config.stream_timeout,
            allow_from: self.config.allow_from.clone().into(),
            closing: self.shutdown.subscribe(),
        })
    }

    fn lifecycle(&self) -> MutexGuard<'_, ChannelLifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChannel")
            .field("config", &self.config)
            .field("state", &self.lifecycle().state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Channel for HttpChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> ChannelResult<()> {
        self.lifecycle().transition(LifecycleEvent::Start)?;
        self.shutdown.send_replace(false);

        let address = self.config.address();
        let listener = match TcpListener::bind((self.config.host.as_str(), self.config.port)).await
        {
            Ok(listener) => listener,
            Err(source) => {
                self.lifecycle().transition(LifecycleEvent::Stop)?;
                return Err(ChannelError::Bind { address, source });
            }
        };
        let bound = listener.local_addr().ok();
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = bound;

        let mut shutdown = self.shutdown.subscribe();
        let listening = bound.map_or(address, |addr| addr.to_string());
        info!(address = %listening, "http channel listening");

        let served = axum::serve(listener, self.app())
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|&stop| stop).await;
            })
            .await;

        self.lifecycle().transition(LifecycleEvent::Stop)?;
        info!("http channel stopped");
        served.map_err(ChannelError::Serve)
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.lifecycle().transition(LifecycleEvent::Stop)?;
        // Raised before draining so `chat` cannot slip a sink in behind it.
        self.shutdown.send_replace(true);
        self.router.shutdown();
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> ChannelResult<Option<String>> {
        self.router.deliver(message.chat_id(), message.clone());
        Ok(None)
    }

    async fn edit(&self, chat_id: &str, _message_id: &str, content: &str) -> ChannelResult<()> {
        self.router
            .deliver(chat_id, OutboundMessage::progress(CHANNEL_NAME, chat_id, content));
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.lifecycle().state().is_running()
    }

    fn allow_from(&self) -> &[String] {
        &self.config.allow_from
    }
}

#[derive(Clone)]
struct ChatState {
    router: Arc<SessionRouter>,
    bus: Arc<MessageBus>,
    stream_timeout: Duration,
    allow_from: Arc<[String]>,
    closing: watch::Receiver<bool>,
}

impl ChatState {
    fn closing(&self) -> bool {
        *self.closing.borrow()
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

fn app(state: ChatState) -> Router {
    Router::new()
        .route("/chat", post(chat).options(preflight))
        .route("/health", get(health))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, GET, OPTIONS"),
        ))
        .layer(TraceLayer::new_for_http())
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match json::to_string(body) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn error_response(status: StatusCode, error: &str) -> Response {
    json_response(status, &ErrorBody { error })
}

async fn chat(State(state): State<ChatState>, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<ChatRequest>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON");
    };

    let Ok(session_id) = SessionId::new(request.session_id) else {
        return error_response(StatusCode::BAD_REQUEST, "session_id is required");
    };
    let message = request.message.trim();
    if message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is required");
    }

    if !sender_allowed(&state.allow_from, SENDER_ID) {
        warn!(sender = SENDER_ID, "sender not allowed on http channel");
        return error_response(StatusCode::FORBIDDEN, "sender not allowed");
    }

    if state.closing() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "agent unavailable");
    }

    // The sink must exist before the agent can possibly reply.
    let sink = state.router.register(session_id.clone());
    let teardown = state.router.teardown(&sink);
    if state.closing() {
        debug!(%session_id, "chat arrived while the channel was stopping");
        drop(teardown);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "agent unavailable");
    }

    let inbound = InboundMessage::new(CHANNEL_NAME, SENDER_ID, session_id.as_str(), message)
        .with_metadata(request_metadata(sink.request_id()));
    if let Err(err) = state.bus.publish_inbound(inbound) {
        warn!(%session_id, error = %err, "could not hand message to agent");
        drop(teardown);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "agent unavailable");
    }
    debug!(%session_id, "chat message accepted");

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(event_stream(sink, teardown, state.stream_timeout)),
    )
        .into_response()
}

fn request_metadata(request_id: RequestId) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("request_id".into(), Value::String(request_id.to_string()));
    metadata
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health() -> Response {
    json_response(StatusCode::OK, &HealthBody { status: "ok" })
}
