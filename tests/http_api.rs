//! HTTP surface: meeting lifecycle endpoints and audio upload validation.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use huddle::api::{self, ApiState};
use huddle::auth::{IdentityVerifier, JwtVerifier};
use huddle::config::UploadConfig;
use huddle::db::SessionStore;
use huddle::meeting::MeetingService;
use huddle::signaling::{RoomBroadcaster, SignalingRelay};
use huddle::transcription::{
    ProviderError, ProviderTranscript, RetryPolicy, TranscriptionProvider, TranscriptionQueue,
    TranscriptionWorker,
};

const BOUNDARY: &str = "huddle-test-boundary";

struct EchoProvider;

#[async_trait]
impl TranscriptionProvider for EchoProvider {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        _file_name: &str,
    ) -> Result<ProviderTranscript, ProviderError> {
        Ok(ProviderTranscript {
            text: String::from_utf8_lossy(audio).to_string(),
            ..Default::default()
        })
    }
}

struct TestApp {
    router: Router,
    jwt: Arc<JwtVerifier>,
    _temp: TempDir,
}

impl TestApp {
    fn new(max_bytes: usize) -> Self {
        let store = SessionStore::in_memory().unwrap();
        let jwt = Arc::new(JwtVerifier::new("http-secret"));
        let verifier: Arc<dyn IdentityVerifier> = jwt.clone();
        let relay = Arc::new(SignalingRelay::new(store.clone(), verifier.clone()));
        let broadcaster: Arc<dyn RoomBroadcaster> = relay.clone();
        let (queue, _worker) = TranscriptionQueue::start(TranscriptionWorker::new(
            Arc::new(EchoProvider),
            store.clone(),
            broadcaster,
            RetryPolicy::default(),
        ));

        let temp = tempfile::tempdir().unwrap();
        let uploads = UploadConfig {
            max_bytes,
            temp_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };

        let state = ApiState {
            meetings: MeetingService::new(store),
            relay,
            queue,
            verifier,
            uploads: Arc::new(uploads),
        };

        Self {
            router: api::router(state),
            jwt,
            _temp: temp,
        }
    }

    fn bearer(&self, user: &str) -> String {
        format!(
            "Bearer {}",
            self.jwt.issue(user, Duration::from_secs(600)).unwrap()
        )
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn create_meeting(&self, host: &str) -> Value {
        let (status, body) = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/meetings")
                    .header(header::AUTHORIZATION, self.bearer(host))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"title": "Standup"}).to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    fn upload(&self, body: Body) -> Request<Body> {
        upload_request(body, Some(&self.bearer("u1")))
    }

    fn get(&self, uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, self.bearer(user))
            .body(Body::empty())
            .unwrap()
    }
}

fn multipart(fields: &[(&str, Option<(&str, &str)>, &[u8])]) -> Body {
    let mut body = Vec::new();
    for (name, file, data) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file {
            Some((file_name, mime)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    name, file_name, mime
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

fn upload_request(body: Body, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/transcribe/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(1024);
    let (status, body) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn test_meeting_endpoints_require_token() {
    let app = TestApp::new(1024);
    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/meetings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_create_and_lookup_meeting() {
    let app = TestApp::new(1024);
    let meeting = app.create_meeting("u1").await;

    assert_eq!(meeting["hostId"], "u1");
    assert_eq!(meeting["isLive"], true);
    assert_eq!(meeting["participantsId"], json!(["u1"]));
    let room_code = meeting["roomCode"].as_str().unwrap().to_string();
    assert_eq!(room_code.len(), 6);

    let (status, by_code) = app
        .send(app.get(&format!("/api/meetings/{}", room_code), "u2"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_code["id"], meeting["id"]);

    let (status, participants) = app
        .send(app.get(&format!("/api/participants/{}", room_code), "u2"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(participants[0]["role"], "host");

    let (status, hosted) = app.send(app.get("/api/meetings/host/u1", "u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hosted.as_array().unwrap().len(), 1);

    let (status, _) = app.send(app.get("/api/meetings/missing", "u1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_host_ends_meeting() {
    let app = TestApp::new(1024);
    let meeting = app.create_meeting("u1").await;
    let id = meeting["id"].as_str().unwrap();

    let end = |user: &str| {
        Request::builder()
            .method("POST")
            .uri(format!("/api/meetings/{}/end", id))
            .header(header::AUTHORIZATION, app.bearer(user))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = app.send(end("u2")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, ended) = app.send(end("u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["isLive"], false);
}

#[tokio::test]
async fn test_upload_validation() {
    let app = TestApp::new(16);
    let meeting = app.create_meeting("u1").await;
    let id = meeting["id"].as_str().unwrap();

    let (status, _) = app
        .send(app.upload(multipart(&[(
            "audio",
            Some(("clip.webm", "audio/webm")),
            &b"abc"[..],
        )])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(app.upload(multipart(&[("meetingId", None, id.as_bytes())])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(app.upload(multipart(&[
            ("meetingId", None, &b"nope"[..]),
            ("audio", Some(("clip.webm", "audio/webm")), &b"abc"[..]),
        ])))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(app.upload(multipart(&[
            ("meetingId", None, id.as_bytes()),
            ("audio", Some(("notes.txt", "text/plain")), &b"abc"[..]),
        ])))
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = app
        .send(app.upload(multipart(&[
            ("meetingId", None, id.as_bytes()),
            ("audio", Some(("big.webm", "audio/webm")), &[0u8; 64][..]),
        ])))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_accepted() {
    let app = TestApp::new(1024);
    let meeting = app.create_meeting("u1").await;
    let code = meeting["roomCode"].as_str().unwrap();

    let (status, body) = app
        .send(app.upload(multipart(&[
            ("meetingId", None, code.as_bytes()),
            ("isFinal", None, &b"true"[..]),
            ("audio", Some(("my clip.webm", "audio/webm;codecs=opus")), &b"hello"[..]),
        ])))
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert!(body["queueLength"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_upload_requires_identity() {
    let app = TestApp::new(1024);
    let meeting = app.create_meeting("u1").await;
    let code = meeting["roomCode"].as_str().unwrap();
    let body = || {
        multipart(&[
            ("meetingId", None, code.as_bytes()),
            ("audio", Some(("clip.webm", "audio/webm")), &b"hello"[..]),
        ])
    };

    let (status, _) = app
        .send(upload_request(body(), Some("Bearer forged.token.value")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(upload_request(body(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, stats) = app
        .send(Request::builder().uri("/api/transcribe/status").body(Body::empty()).unwrap())
        .await;
    assert_eq!(stats["queueLength"], 0);
    assert_eq!(stats["committed"], 0);
}

#[tokio::test]
async fn test_upcoming_meetings_for_caller() {
    let app = TestApp::new(1024);
    let schedule = |user: &str, at: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/meetings")
            .header(header::AUTHORIZATION, app.bearer(user))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"title": "Planning", "isScheduled": true, "scheduleAt": at}).to_string(),
            ))
            .unwrap()
    };

    let (_, later) = app.send(schedule("u1", "2099-02-01T09:00:00Z")).await;
    let (_, sooner) = app.send(schedule("u1", "2099-01-01T09:00:00Z")).await;
    app.send(schedule("u1", "2001-01-01T09:00:00Z")).await;
    app.send(schedule("u2", "2099-01-15T09:00:00Z")).await;

    let (status, upcoming) = app.send(app.get("/api/meetings/upcoming", "u1")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&Value> = upcoming
        .as_array()
        .unwrap()
        .iter()
        .map(|m| &m["id"])
        .collect();
    assert_eq!(ids, vec![&sooner["id"], &later["id"]]);
    assert_eq!(upcoming[0]["isLive"], false);
}
