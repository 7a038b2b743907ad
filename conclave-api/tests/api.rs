//! End-to-end tests of the HTTP API with an in-process engine and relay

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use conclave_api::{create_router, AppState, RelayNotifier};
use conclave_relay::{Relay, RelayConfig, RelayConnection};
use conclave_sfu::{LocalEngine, SfuConfig, SfuManager};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    relay: Arc<Relay>,
}

impl TestApp {
    fn new() -> Self {
        let relay = Arc::new(Relay::new(RelayConfig::default()));
        let sfu = SfuManager::new(
            SfuConfig::default(),
            Arc::new(LocalEngine::new()),
            Arc::new(RelayNotifier::new(Arc::clone(&relay))),
        );
        let router = create_router(AppState {
            sfu,
            relay: Arc::clone(&relay),
        });
        Self { router, relay }
    }

    async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.request(method, uri, body).await;
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register a relay connection the way a client's `{id}` frame would
    fn listen(&self, peer: &str) -> (RelayConnection, mpsc::Receiver<String>) {
        let (mut connection, rx) = self.relay.connect();
        connection
            .handle_text(&json!({ "id": peer }).to_string())
            .unwrap();
        (connection, rx)
    }

    async fn create_room(&self, room: &str) -> String {
        let (status, body) = self
            .json(Method::POST, "/rooms", Some(json!({ "roomId": room })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["transport"]["id"].as_str().unwrap().to_string()
    }

    async fn connect(&self, room: &str, transport: &str, peer: &str) {
        let (_, caps) = self.json(Method::GET, "/capabilities", None).await;
        let (status, body) = self
            .json(
                Method::POST,
                &format!("/rooms/{room}/transports/{transport}/connect"),
                Some(json!({
                    "ship": peer,
                    "dtlsParameters": { "role": "client", "fingerprints": [] },
                    "rtpCapabilities": caps["routerRtpCapabilities"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["id"], transport);
    }

    async fn produce(&self, room: &str, transport: &str, peer: &str, kind: &str) -> String {
        let (status, body) = self
            .json(
                Method::POST,
                &format!("/rooms/{room}/transports/{transport}/produce"),
                Some(json!({ "ship": peer, "kind": kind, "rtpParameters": { "codecs": [] } })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

async fn next_push(rx: &mut mpsc::Receiver<String>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("push arrives")
        .expect("relay channel open");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_two_peer_room_scenario() {
    let app = TestApp::new();

    // Two simultaneous creations of the same room share one transport
    let (a, b) = tokio::join!(app.create_room("r1"), app.create_room("r1"));
    assert_eq!(a, b);
    let transport = a;

    let (_p2_connection, mut p2_rx) = app.listen("p2");
    app.connect("r1", &transport, "p2").await;
    app.connect("r1", &transport, "p1").await;

    let producer_id = app.produce("r1", &transport, "p1", "video").await;

    let push = next_push(&mut p2_rx).await;
    assert_eq!(push["addConsumer"]["ship"], "p1");
    assert_eq!(push["addConsumer"]["kind"], "video");
    assert_eq!(push["addConsumer"]["consumer"]["producerId"], producer_id.as_str());
    let consumer_id = push["addConsumer"]["consumer"]["id"].clone();

    let (status, body) = app
        .json(Method::GET, "/rooms/r1/peers/p2/consumers", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consumers"]["p1"]["video"]["id"], consumer_id);

    let (status, _) = app
        .request(Method::POST, "/rooms/r1/peers/p2/consumers/p1/video/resume", None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.request(Method::DELETE, "/rooms/r1/peers/p1", None).await;
    assert_eq!(status, StatusCode::OK);

    let push = next_push(&mut p2_rx).await;
    assert_eq!(push, json!({ "removeConsumer": { "ship": "p1" } }));
    assert!(p2_rx.try_recv().is_err(), "exactly one push per event");

    let (_, body) = app
        .json(Method::GET, "/rooms/r1/peers/p2/consumers", None)
        .await;
    assert!(body["consumers"].get("p1").is_none());

    // Deleting again is a no-op
    let (status, _) = app.request(Method::DELETE, "/rooms/r1/peers/p1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(p2_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_late_joiner_catches_up_without_push() {
    let app = TestApp::new();
    let transport = app.create_room("r1").await;

    app.connect("r1", &transport, "p1").await;
    let audio = app.produce("r1", &transport, "p1", "audio").await;
    let video = app.produce("r1", &transport, "p1", "video").await;

    let (_late_connection, mut late_rx) = app.listen("late");
    app.connect("r1", &transport, "late").await;

    let (status, body) = app
        .json(Method::GET, "/rooms/r1/peers/late/consumers", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consumers"]["p1"]["audio"]["producerId"], audio.as_str());
    assert_eq!(body["consumers"]["p1"]["video"]["producerId"], video.as_str());
    assert!(late_rx.try_recv().is_err());

    let (_, stats) = app.json(Method::GET, "/stats", None).await;
    assert_eq!(stats["rooms"], 1);
    assert_eq!(stats["peers"], 2);
    assert_eq!(stats["producers"], 2);
    assert_eq!(stats["consumers"], 2);
    assert_eq!(stats["relayConnections"], 1);
}

#[tokio::test]
async fn test_error_responses() {
    let app = TestApp::new();

    let (status, body) = app
        .json(
            Method::POST,
            "/rooms/nope/transports/t1/connect",
            Some(json!({ "ship": "p1", "dtlsParameters": {}, "rtpCapabilities": {} })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = app
        .json(Method::POST, "/rooms", Some(json!({ "roomId": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let transport = app.create_room("r1").await;
    let (status, body) = app
        .json(
            Method::POST,
            &format!("/rooms/r1/transports/{transport}/connect"),
            Some(json!({ "ship": " ", "dtlsParameters": {}, "rtpCapabilities": {} })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("peer id"));

    let (status, _) = app
        .json(
            Method::POST,
            "/rooms/r1/transports/other/produce",
            Some(json!({ "ship": "p1", "kind": "audio", "rtpParameters": {} })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.connect("r1", &transport, "p1").await;
    let (status, body) = app
        .json(Method::POST, "/rooms/r1/peers/p1/consumers/p2/audio/resume", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, _) = app
        .json(Method::POST, "/rooms/r1/peers/p1/consumers/p2/screen/resume", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(Method::GET, "/rooms/r1/peers/ghost/consumers", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.request(Method::DELETE, "/rooms/missing/peers/p1", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_liveness_endpoints() {
    let app = TestApp::new();

    for (uri, expected) in [("/", "hello world"), ("/health-check", "all good bro"), ("/health", "OK")] {
        let (status, body) = app.request(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }

    let (status, body) = app.json(Method::GET, "/capabilities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["routerRtpCapabilities"]["codecs"].is_array());
}
