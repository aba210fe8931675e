//! Integration test: drive the webhook end to end with signed LINE payloads.
//! Local axum servers stand in for the LINE reply API and the completion API.

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use lib::channels::line::{sign_body, SIGNATURE_HEADER};
use lib::config::Config;
use lib::gateway;
use lib::profile::StoreProfile;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SECRET: &str = "test-channel-secret";

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<Value>>>);

impl Recorded {
    fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

async fn serve_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// LINE reply API stub: records `{auth, body}` per call.
async fn line_stub() -> (String, Recorded) {
    async fn reply(
        State(rec): State<Recorded>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        rec.0.lock().unwrap().push(json!({ "auth": auth, "body": body }));
        Json(json!({}))
    }
    let rec = Recorded::default();
    let app = Router::new()
        .route("/v2/bot/message/reply", post(reply))
        .with_state(rec.clone());
    (serve_stub(app).await, rec)
}

#[derive(Clone)]
struct CompletionStub {
    rec: Recorded,
    status: StatusCode,
    body: Value,
}

/// Completion API stub answering every POST /responses with a fixed status and body.
async fn completion_stub(status: StatusCode, body: Value) -> (String, Recorded) {
    async fn responses(
        State(stub): State<CompletionStub>,
        Json(req): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        stub.rec.0.lock().unwrap().push(req);
        (stub.status, Json(stub.body.clone()))
    }
    let rec = Recorded::default();
    let app = Router::new()
        .route("/responses", post(responses))
        .with_state(CompletionStub {
            rec: rec.clone(),
            status,
            body,
        });
    (serve_stub(app).await, rec)
}

/// Env values that would override the test config.
fn env_overrides_set() -> bool {
    [
        "LINE_CHANNEL_ACCESS_TOKEN",
        "LINE_CHANNEL_SECRET",
        "OPENAI_API_KEY",
        "HANDOFF_TTL_MIN",
    ]
    .iter()
    .any(|name| std::env::var(name).is_ok())
}

struct Harness {
    webhook_url: String,
    client: reqwest::Client,
    line: Recorded,
    completion: Recorded,
}

impl Harness {
    /// `None` when the environment overrides the test config.
    async fn start(completion_status: StatusCode, completion_body: Value) -> Option<Self> {
        if env_overrides_set() {
            return None;
        }
        let (line_base, line) = line_stub().await;
        let (completion_base, completion) = completion_stub(completion_status, completion_body).await;

        let dir: PathBuf =
            std::env::temp_dir().join(format!("cafebot-webhook-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create config dir");
        let config_path = dir.join("config.json");

        let port = free_port();
        let mut config = Config::default();
        config.gateway.port = port;
        config.line.channel_access_token = Some("test-access-token".to_string());
        config.line.channel_secret = Some(SECRET.to_string());
        config.line.api_base = Some(line_base);
        config.completion.api_key = Some("test-api-key".to_string());
        config.completion.base_url = completion_base;
        config.completion.timeout_secs = 5;

        tokio::spawn(async move {
            let _ = gateway::run_gateway(config, config_path).await;
        });

        let client = reqwest::Client::new();
        let health = format!("http://127.0.0.1:{}/", port);
        for _ in 0..100 {
            if let Ok(resp) = client.get(&health).send().await {
                if resp.status().is_success() {
                    return Some(Self {
                        webhook_url: format!("http://127.0.0.1:{}/api/webhook", port),
                        client,
                        line,
                        completion,
                    });
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("gateway did not become healthy within 5s");
    }

    async fn post_signed(&self, body: &[u8]) -> (StatusCode, String) {
        self.post_with_signature(body, &sign_body(SECRET, body)).await
    }

    async fn post_with_signature(&self, body: &[u8], signature: &str) -> (StatusCode, String) {
        let resp = self
            .client
            .post(&self.webhook_url)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_vec())
            .send()
            .await
            .expect("webhook request");
        let status = resp.status();
        (status, resp.text().await.unwrap_or_default())
    }

    /// POST a batch of `(user, text, reply token)` text events.
    async fn send_texts(&self, events: &[(&str, &str, &str)]) -> (StatusCode, String) {
        let events: Vec<Value> = events
            .iter()
            .map(|(user, text, token)| {
                json!({
                    "type": "message",
                    "replyToken": token,
                    "source": { "type": "user", "userId": user },
                    "message": { "type": "text", "id": "1", "text": text }
                })
            })
            .collect();
        let body = serde_json::to_vec(&json!({ "destination": "Ubot", "events": events })).unwrap();
        self.post_signed(&body).await
    }
}

fn ok_completion(text: &str) -> Value {
    json!({
        "id": "resp_1",
        "output": [{ "type": "message", "role": "assistant",
                     "content": [{ "type": "output_text", "text": text, "annotations": [] }] }]
    })
}

fn cafe() -> StoreProfile {
    StoreProfile::preset("cafe").expect("cafe preset")
}

#[tokio::test]
async fn fixed_answer_is_replied_through_line() {
    let Some(h) = Harness::start(StatusCode::OK, ok_completion("unused")).await else {
        return;
    };
    let (status, body) = h.send_texts(&[("U1", "営業時間", "rt-1")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let sent = h.line.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["auth"], "Bearer test-access-token");
    assert_eq!(sent[0]["body"]["replyToken"], "rt-1");
    assert_eq!(sent[0]["body"]["messages"][0]["type"], "text");
    assert_eq!(
        sent[0]["body"]["messages"][0]["text"],
        cafe().answers["営業時間"].as_str()
    );
    assert!(h.completion.take().is_empty());
}

#[tokio::test]
async fn unmatched_text_uses_completion_with_facts() {
    let Some(h) = Harness::start(StatusCode::OK, ok_completion("公式情報をご確認ください")).await else {
        return;
    };
    let (status, _) = h.send_texts(&[("U1", "宇宙について教えて", "rt-2")]).await;
    assert_eq!(status, StatusCode::OK);

    let requests = h.completion.take();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["model"], "gpt-4o-mini");
    let user_turn = requests[0]["input"][1]["content"].as_str().unwrap_or_default();
    assert!(user_turn.contains("【営業時間】"));
    assert!(user_turn.ends_with("宇宙について教えて"));

    let sent = h.line.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["body"]["messages"][0]["text"], "公式情報をご確認ください");
}

#[tokio::test]
async fn completion_failure_replies_with_error_text() {
    let Some(h) = Harness::start(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": { "message": "boom" } }),
    ).await else {
        return;
    };
    let (status, _) = h.send_texts(&[("U1", "宇宙について教えて", "rt-3")]).await;
    assert_eq!(status, StatusCode::OK);
    let sent = h.line.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0]["body"]["messages"][0]["text"],
        cafe().messages.completion_error.as_str()
    );
}

#[tokio::test]
async fn handoff_silences_sender_across_requests() {
    let Some(h) = Harness::start(StatusCode::OK, ok_completion("unused")).await else {
        return;
    };
    h.send_texts(&[("U1", "予約したい", "rt-a")]).await;
    h.send_texts(&[("U1", "営業時間", "rt-b"), ("U2", "営業時間", "rt-c")])
        .await;
    h.send_texts(&[("U1", "対応終了", "rt-d")]).await;

    let tokens: Vec<String> = h
        .line
        .take()
        .iter()
        .map(|s| s["body"]["replyToken"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(tokens.len(), 3);
    assert!(tokens.contains(&"rt-a".to_string()));
    assert!(!tokens.contains(&"rt-b".to_string()));
    assert!(tokens.contains(&"rt-c".to_string()));
    assert_eq!(tokens.last().map(String::as_str), Some("rt-d"));
}

#[tokio::test]
async fn greeting_carries_quick_replies() {
    let Some(h) = Harness::start(StatusCode::OK, ok_completion("unused")).await else {
        return;
    };
    h.send_texts(&[("U1", "こんにちは", "rt-g")]).await;
    let sent = h.line.take();
    let items = sent[0]["body"]["messages"][0]["quickReply"]["items"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0]["action"]["text"], "ランチ");
}

#[tokio::test]
async fn bad_signature_is_forbidden_and_not_processed() {
    let Some(h) = Harness::start(StatusCode::OK, ok_completion("unused")).await else {
        return;
    };
    let body = serde_json::to_vec(&json!({ "events": [{
        "type": "message", "replyToken": "rt-x",
        "source": { "userId": "U1" }, "message": { "type": "text", "text": "営業時間" }
    }] }))
    .unwrap();
    let (status, _) = h.post_with_signature(&body, &sign_body("wrong", &body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.line.take().is_empty());
}

#[tokio::test]
async fn non_post_and_malformed_bodies_are_acknowledged() {
    let Some(h) = Harness::start(StatusCode::OK, ok_completion("unused")).await else {
        return;
    };
    let resp = h.client.get(&h.webhook_url).send().await.expect("GET webhook");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap_or_default(), "ok");

    let (status, body) = h.post_signed(b"this is not json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, _) = h.post_signed(br#"{"events":[{"type":"follow","replyToken":"r"}]}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.line.take().is_empty());
}
