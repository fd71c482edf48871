//! End-to-end tests: drive the router in-process against a scratch SQLite
//! database and upload directory, with a scripted transcriber.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use murmur_api::storage::UploadDir;
use murmur_api::transcription::{ScriptedOutcome, ScriptedTranscriber};
use murmur_api::voice::is_sentinel_transcription;
use murmur_api::{AppStateInner, router};
use murmur_db::Database;

const BOUNDARY: &str = "murmur-test-boundary";

struct TestApp {
    _dir: TempDir,
    router: Router,
    state: murmur_api::AppState,
    transcriber: Arc<ScriptedTranscriber>,
}

impl TestApp {
    async fn new(outcome: ScriptedOutcome) -> Self {
        Self::with_timeout(outcome, Duration::from_secs(5)).await
    }

    async fn with_timeout(outcome: ScriptedOutcome, transcription_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("murmur.db")).unwrap();
        let uploads = UploadDir::new(dir.path().join("uploads")).await.unwrap();
        let transcriber = Arc::new(ScriptedTranscriber::new(outcome));

        let state = Arc::new(AppStateInner {
            db,
            uploads,
            transcriber: transcriber.clone(),
            max_content_length: 500,
            max_upload_bytes: 1024 * 1024,
            transcription_timeout,
        });

        Self {
            _dir: dir,
            router: router(state.clone()),
            state,
            transcriber,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn post_voice(&self, parts: &[FormPart<'_>]) -> (StatusCode, Value) {
        self.send(
            Request::post("/voice_messages")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(parts)))
                .unwrap(),
        )
        .await
    }

    async fn create_user(&self, username: &str) -> i64 {
        let (status, body) = self.post_json("/users", json!({ "username": username })).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    async fn upload_files(&self) -> Vec<String> {
        self.state.uploads.list_files().await.unwrap()
    }
}

enum FormPart<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File(filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

// -- Users --

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;

    let (status, body) = app.post_json("/users", json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "alice");
    assert!(body["id"].is_i64());

    let (status, body) = app.post_json("/users", json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username already exists");

    let (status, body) = app.get("/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_user_requests_are_bad_requests() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;

    let (status, body) = app.post_json("/users", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username is required");

    let (status, _) = app.post_json("/users", json!({ "username": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Request::post("/users")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// -- Text messages --

#[tokio::test]
async fn sent_message_round_trips_in_either_order() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let (status, sent) = app
        .post_json(
            "/messages",
            json!({ "sender_id": alice, "recipient_id": bob, "content": "hi bob" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["content"], "hi bob");
    assert!(sent["timestamp"].is_string());

    for uri in [
        format!("/messages?user1_id={}&user2_id={}", alice, bob),
        format!("/messages?user1_id={}&user2_id={}", bob, alice),
    ] {
        let (status, convo) = app.get(&uri).await;
        assert_eq!(status, StatusCode::OK);
        let convo = convo.as_array().unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0], sent);
    }
}

#[tokio::test]
async fn unknown_sender_is_not_found_and_not_stored() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;
    let bob = app.create_user("bob").await;

    let (status, body) = app
        .post_json(
            "/messages",
            json!({ "sender_id": 999, "recipient_id": bob, "content": "hello" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Sender or recipient not found");

    let (_, convo) = app
        .get(&format!("/messages?user1_id=999&user2_id={}", bob))
        .await;
    assert!(convo.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn message_validation() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let (status, _) = app
        .post_json("/messages", json!({ "sender_id": alice, "recipient_id": bob }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json(
            "/messages",
            json!({ "sender_id": alice, "recipient_id": bob, "content": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let at_limit = "é".repeat(500);
    let (status, _) = app
        .post_json(
            "/messages",
            json!({ "sender_id": alice, "recipient_id": bob, "content": at_limit }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let over_limit = "x".repeat(501);
    let (status, body) = app
        .post_json(
            "/messages",
            json!({ "sender_id": alice, "recipient_id": bob, "content": over_limit }),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "message is longer than 500 characters");
}

#[tokio::test]
async fn conversation_query_requires_both_ids() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;

    for uri in [
        "/messages",
        "/messages?user1_id=1",
        "/messages?user1_id=1&user2_id=abc",
        "/voice_messages?user2_id=2",
    ] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn concurrent_sends_come_back_in_timestamp_order() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let router = app.router.clone();
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            let request = Request::post("/messages")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "sender_id": from, "recipient_id": to, "content": format!("msg {}", i) })
                        .to_string(),
                ))
                .unwrap();
            router.oneshot(request).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::CREATED);
    }

    let (_, convo) = app
        .get(&format!("/messages?user1_id={}&user2_id={}", alice, bob))
        .await;
    let stamps: Vec<&str> = convo
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["timestamp"].as_str().unwrap())
        .collect();
    assert_eq!(stamps.len(), 20);

    let parsed: Vec<chrono::DateTime<chrono::Utc>> =
        stamps.iter().map(|s| s.parse().unwrap()).collect();
    assert!(parsed.windows(2).all(|w| w[0] <= w[1]));
}

// -- Voice messages --

#[tokio::test]
async fn disallowed_extension_is_rejected_before_storage() {
    let app = TestApp::new(ScriptedOutcome::Reply("unused".into())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (alice_s, bob_s) = (alice.to_string(), bob.to_string());

    let (status, body) = app
        .post_voice(&[
            FormPart::File("clip.EXE", b"MZ\x90\x00"),
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &bob_s),
        ])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("File type not allowed"));

    assert!(app.transcriber.calls().is_empty());
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn extension_is_checked_on_the_uploaded_name() {
    let app = TestApp::new(ScriptedOutcome::Reply("unused".into())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (alice_s, bob_s) = (alice.to_string(), bob.to_string());

    // Sanitizing would turn these into .wav / .mp3 names
    for name in ["clip.w%av", "clip.m p3", "clip.o#gg"] {
        let (status, body) = app
            .post_voice(&[
                FormPart::File(name, b"RIFF\x24\x00\x00\x00WAVE"),
                FormPart::Text("sender_id", &alice_s),
                FormPart::Text("recipient_id", &bob_s),
            ])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", name);
        assert!(body["error"].as_str().unwrap().contains("File type not allowed"));
    }

    assert!(app.transcriber.calls().is_empty());
    assert!(app.upload_files().await.is_empty());

    let (_, listed) = app
        .get(&format!("/voice_messages?user1_id={}&user2_id={}", alice, bob))
        .await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = TestApp::new(ScriptedOutcome::Reply("unused".into())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (alice_s, bob_s) = (alice.to_string(), bob.to_string());

    let audio = vec![0u8; 2 * 1024 * 1024];
    let (status, body) = app
        .post_voice(&[
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &bob_s),
            FormPart::File("clip.wav", &audio),
        ])
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "upload exceeds the 1048576 byte limit");

    assert!(app.transcriber.calls().is_empty());
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn failed_transcription_still_persists_and_cleans_up() {
    let app = TestApp::new(ScriptedOutcome::Fail("provider unavailable".into())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (alice_s, bob_s) = (alice.to_string(), bob.to_string());

    let (status, body) = app
        .post_voice(&[
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &bob_s),
            FormPart::File("clip.wav", b"RIFF\x24\x00\x00\x00WAVE"),
        ])
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["filename"], "clip.wav");
    let transcription = body["transcription"].as_str().unwrap();
    assert!(is_sentinel_transcription(transcription));
    assert!(transcription.contains("provider unavailable"));

    // The transcriber saw the stored bytes, and the file is gone afterwards
    let calls = app.transcriber.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].audio, b"RIFF\x24\x00\x00\x00WAVE");
    assert!(!calls[0].path.exists());
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn transcribed_voice_message_is_listed() {
    let app = TestApp::new(ScriptedOutcome::Reply("running late".into())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (alice_s, bob_s) = (alice.to_string(), bob.to_string());

    let (status, sent) = app
        .post_voice(&[
            FormPart::File("../../etc/Voice Note.OGG", b"OggS"),
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &bob_s),
        ])
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["transcription"], "running late");
    assert_eq!(sent["filename"], "Voice_Note.OGG");

    let (status, convo) = app
        .get(&format!("/voice_messages?user1_id={}&user2_id={}", bob, alice))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(convo.as_array().unwrap(), &vec![sent]);
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn stalled_transcription_times_out_to_sentinel() {
    let app =
        TestApp::with_timeout(ScriptedOutcome::Stall, Duration::from_millis(100)).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (alice_s, bob_s) = (alice.to_string(), bob.to_string());

    let (status, body) = app
        .post_voice(&[
            FormPart::File("clip.mp3", b"ID3"),
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &bob_s),
        ])
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["transcription"].as_str().unwrap().contains("timed out"));
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn persistence_failure_still_removes_upload() {
    let app = TestApp::new(ScriptedOutcome::Reply("lost".into())).await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (alice_s, bob_s) = (alice.to_string(), bob.to_string());

    app.state
        .db
        .with_conn_mut(|conn| {
            conn.execute_batch("DROP TABLE voice_messages")?;
            Ok(())
        })
        .unwrap();

    let (status, body) = app
        .post_voice(&[
            FormPart::File("clip.wav", b"RIFF"),
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &bob_s),
        ])
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");

    assert_eq!(app.transcriber.calls().len(), 1);
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn malformed_voice_uploads_are_rejected() {
    let app = TestApp::new(ScriptedOutcome::Reply("unused".into())).await;
    let alice = app.create_user("alice").await;
    let alice_s = alice.to_string();

    let (status, body) = app
        .post_voice(&[
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &alice_s),
        ])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file part");

    let (status, body) = app
        .post_voice(&[
            FormPart::File("", b"RIFF"),
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", &alice_s),
        ])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No selected file");

    let (status, body) = app
        .post_voice(&[
            FormPart::File("clip.wav", b"RIFF"),
            FormPart::Text("sender_id", &alice_s),
        ])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "sender_id and recipient_id are required");

    let (status, _) = app
        .post_voice(&[
            FormPart::File("clip.wav", b"RIFF"),
            FormPart::Text("sender_id", "alice"),
            FormPart::Text("recipient_id", &alice_s),
        ])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Request::post("/voice_messages")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.transcriber.calls().is_empty());
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn voice_message_to_unknown_user_is_not_found() {
    let app = TestApp::new(ScriptedOutcome::Reply("unused".into())).await;
    let alice = app.create_user("alice").await;
    let alice_s = alice.to_string();

    let (status, _) = app
        .post_voice(&[
            FormPart::File("clip.wav", b"RIFF"),
            FormPart::Text("sender_id", &alice_s),
            FormPart::Text("recipient_id", "4242"),
        ])
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.transcriber.calls().is_empty());
    assert!(app.upload_files().await.is_empty());
}

#[tokio::test]
async fn health_check() {
    let app = TestApp::new(ScriptedOutcome::Reply(String::new())).await;
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}
