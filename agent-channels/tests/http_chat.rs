use std::sync::Arc;
use std::time::Duration;

use agent_channels::{HttpChannel, HttpChannelConfig};
use agent_kernel::{Channel, ChannelError, LifecycleError, MessageBus};
use agent_primitives::OutboundMessage;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn channel(config: HttpChannelConfig) -> (Arc<MessageBus>, Arc<HttpChannel>) {
    let bus = Arc::new(MessageBus::new());
    let channel = Arc::new(HttpChannel::new(config, Arc::clone(&bus)));
    (bus, channel)
}

async fn post_chat(app: &Router, body: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn assert_cors(response: &Response) {
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "POST, GET, OPTIONS"
    );
}

#[tokio::test]
async fn health_reports_ok() {
    let (_bus, channel) = channel(HttpChannelConfig::default());
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let response = channel.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert_eq!(body_text(response).await, r#"{"status": "ok"}"#);
}

#[tokio::test]
async fn preflight_is_no_content_with_cors() {
    let (_bus, channel) = channel(HttpChannelConfig::default());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/chat")
        .body(Body::empty())
        .unwrap();

    let response = channel.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_cors(&response);
}

#[tokio::test]
async fn malformed_requests_are_rejected_with_cors() {
    let (bus, channel) = channel(HttpChannelConfig::default());
    let app = channel.app();

    let cases = [
        ("{not json", r#"{"error": "Invalid JSON"}"#),
        (
            r#"{"session_id": "", "message": "hi"}"#,
            r#"{"error": "session_id is required"}"#,
        ),
        (
            r#"{"message": "hi"}"#,
            r#"{"error": "session_id is required"}"#,
        ),
        (
            r#"{"session_id": "s1", "message": "   "}"#,
            r#"{"error": "message is required"}"#,
        ),
    ];

    for (body, expected) in cases {
        let response = post_chat(&app, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_cors(&response);
        assert_eq!(body_text(response).await, expected);
    }

    assert!(channel.router().is_empty());
    bus.close();
    assert!(bus.consume_inbound().await.is_none());
}

#[tokio::test]
async fn stream_relays_progress_then_final_then_done() {
    let (bus, channel) = channel(HttpChannelConfig::default());
    let app = channel.app();

    let agent = {
        let bus = Arc::clone(&bus);
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            let inbound = bus.consume_inbound().await.unwrap();
            for step in ["step 1", "step 2"] {
                channel
                    .send(&OutboundMessage::progress_to(&inbound, step))
                    .await
                    .unwrap();
            }
            channel
                .send(&OutboundMessage::reply_to(&inbound, "all done"))
                .await
                .unwrap();
            inbound
        })
    };

    let response = post_chat(&app, r#"{"session_id": " s1 ", "message": " hi "}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let inbound = agent.await.unwrap();
    assert_eq!(inbound.channel(), "http");
    assert_eq!(inbound.sender_id(), "desktop");
    assert_eq!(inbound.chat_id(), "s1");
    assert_eq!(inbound.content(), "hi");
    assert!(inbound.metadata()["request_id"].is_string());

    assert_eq!(
        body_text(response).await,
        concat!(
            "event: progress\ndata: {\"content\": \"step 1\"}\n\n",
            "event: progress\ndata: {\"content\": \"step 2\"}\n\n",
            "event: message\ndata: {\"content\": \"all done\"}\n\n",
            "event: done\ndata: {}\n\n",
        )
    );
    assert!(channel.router().is_empty());
}

#[tokio::test]
async fn idle_stream_times_out_with_error_event() {
    let (_bus, channel) = channel(HttpChannelConfig {
        stream_timeout: Duration::from_millis(50),
        ..HttpChannelConfig::default()
    });

    let response = post_chat(&channel.app(), r#"{"session_id": "s1", "message": "hi"}"#).await;

    assert_eq!(
        body_text(response).await,
        "event: error\ndata: {\"error\": \"Request timed out\"}\n\n"
    );
    assert!(channel.router().is_empty());
}

#[tokio::test]
async fn newer_request_retires_the_older_stream() {
    let (_bus, channel) = channel(HttpChannelConfig::default());
    let app = channel.app();

    let first = post_chat(&app, r#"{"session_id": "s1", "message": "one"}"#).await;
    let second = post_chat(&app, r#"{"session_id": "s1", "message": "two"}"#).await;
    assert_eq!(channel.router().len(), 1);

    assert_eq!(body_text(first).await, "");
    assert!(channel.router().is_registered("s1"));

    assert!(
        channel
            .router()
            .deliver("s1", OutboundMessage::reply("http", "s1", "for two"))
    );
    assert_eq!(
        body_text(second).await,
        "event: message\ndata: {\"content\": \"for two\"}\n\nevent: done\ndata: {}\n\n"
    );
    assert!(channel.router().is_empty());
}

#[tokio::test]
async fn dropped_response_releases_the_session() {
    let (_bus, channel) = channel(HttpChannelConfig::default());

    let response = post_chat(&channel.app(), r#"{"session_id": "s1", "message": "hi"}"#).await;
    assert!(channel.router().is_registered("s1"));

    drop(response);
    assert!(!channel.router().is_registered("s1"));
    assert!(
        !channel
            .router()
            .deliver("s1", OutboundMessage::reply("http", "s1", "too late"))
    );
}

#[tokio::test]
async fn stop_ends_open_streams_without_done() {
    let (_bus, channel) = channel(HttpChannelConfig::default());

    let response = post_chat(&channel.app(), r#"{"session_id": "s1", "message": "hi"}"#).await;
    channel.stop().await.unwrap();

    assert_eq!(body_text(response).await, "");
    assert!(channel.router().is_empty());
}

#[tokio::test]
async fn chat_after_stop_is_refused_without_leaking_a_sink() {
    let (bus, channel) = channel(HttpChannelConfig::default());
    let app = channel.app();
    channel.stop().await.unwrap();

    let response = post_chat(&app, r#"{"session_id": "s1", "message": "hi"}"#).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_cors(&response);
    assert_eq!(body_text(response).await, r#"{"error": "agent unavailable"}"#);
    assert!(channel.router().is_empty());
    bus.close();
    assert!(bus.consume_inbound().await.is_none());
}

#[tokio::test]
async fn disallowed_sender_is_forbidden() {
    let (_bus, channel) = channel(HttpChannelConfig {
        allow_from: vec!["someone-else".into()],
        ..HttpChannelConfig::default()
    });

    let response = post_chat(&channel.app(), r#"{"session_id": "s1", "message": "hi"}"#).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, r#"{"error": "sender not allowed"}"#);
    assert!(channel.router().is_empty());
}

#[tokio::test]
async fn closed_bus_is_service_unavailable() {
    let (bus, channel) = channel(HttpChannelConfig::default());
    bus.close();

    let response = post_chat(&channel.app(), r#"{"session_id": "s1", "message": "hi"}"#).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(response).await, r#"{"error": "agent unavailable"}"#);
    assert!(channel.router().is_empty());
}

#[tokio::test]
async fn start_serves_until_stopped() {
    let (_bus, channel) = channel(HttpChannelConfig {
        port: 0,
        ..HttpChannelConfig::default()
    });

    let server = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.start().await })
    };

    for _ in 0..200 {
        if channel.local_addr().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let addr = channel.local_addr().expect("listener bound");
    assert_ne!(addr.port(), 0);
    assert!(channel.is_running());

    let second = channel.start().await;
    assert!(matches!(
        second,
        Err(ChannelError::Lifecycle(LifecycleError::AlreadyRunning { .. }))
    ));

    channel.stop().await.unwrap();
    channel.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server shut down")
        .unwrap()
        .unwrap();
    assert!(!channel.is_running());
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let (_bus, channel) = channel(HttpChannelConfig {
        port,
        ..HttpChannelConfig::default()
    });

    let err = channel.start().await.unwrap_err();

    assert!(matches!(err, ChannelError::Bind { .. }), "{err}");
    assert!(!channel.is_running());
}
