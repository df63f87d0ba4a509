//! End-to-end tests: webhook delivery → intake → reply + log → web pages.
//!
//! Each test spins up the real Axum server on a random port, points the
//! Telegram client at a mockito server, and drives the relay over HTTP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mockito::Matcher;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use chat_relay::channels::webhook::SECRET_HEADER;
use chat_relay::channels::{TelegramApi, TelegramWebhookChannel};
use chat_relay::error::LlmError;
use chat_relay::intake::{IntakeMachine, greeting};
use chat_relay::llm::{
    CompletionRequest, CompletionResponse, LlmProvider, TextCompleter,
};
use chat_relay::relay::Relay;
use chat_relay::sessions::InMemorySessionDirectory;
use chat_relay::store::{ConversationStore, LibSqlBackend, SortOrder};
use chat_relay::web::web_routes;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const BOT_TOKEN: &str = "123:ABC";
const SECRET: &str = "test-secret";

/// Answers arithmetic the way the scenario expects; counts calls.
struct StubLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = match request.prompt.as_str() {
            "What is 2+2?" => "4".to_string(),
            other => format!("you said: {other}"),
        };
        Ok(CompletionResponse { content })
    }
}

struct Harness {
    base: String,
    http: reqwest::Client,
    store: Arc<LibSqlBackend>,
    llm: Arc<StubLlm>,
}

/// Start the relay (webhook mode) and web server. `telegram` is the mock
/// Bot API server.
async fn start_relay(telegram: &mockito::ServerGuard) -> Harness {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let llm = Arc::new(StubLlm {
        calls: AtomicUsize::new(0),
    });
    let intake = Arc::new(IntakeMachine::new(
        Arc::new(InMemorySessionDirectory::new()),
        TextCompleter::new(llm.clone(), Duration::from_secs(5)),
        store.clone(),
    ));

    let api = TelegramApi::new(BOT_TOKEN).with_base_url(telegram.url());
    let webhook = TelegramWebhookChannel::with_secret(api, "bot.example.com", SECRET);
    let app = web_routes(store.clone(), Some(webhook.router())).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::spawn(async move {
        Relay::new(Arc::new(webhook), intake)
            .run_until(std::future::pending())
            .await
            .unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Harness {
        base: format!("http://127.0.0.1:{port}"),
        http: reqwest::Client::new(),
        store,
        llm,
    }
}

fn update(update_id: i64, user_id: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "from": { "id": user_id, "is_bot": false, "first_name": "Test" },
            "chat": { "id": user_id, "type": "private" },
            "date": 1_700_000_000,
            "text": text,
        }
    })
}

impl Harness {
    async fn deliver(&self, body: &Value) -> reqwest::StatusCode {
        self.http
            .post(format!("{}/telegram/123_ABC", self.base))
            .header(SECRET_HEADER, SECRET)
            .json(body)
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn wait_for_records(&self, n: u64) {
        while self.store.count().await.unwrap() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn mock_set_webhook(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/bot123:ABC/setWebhook")
        .match_body(Matcher::PartialJson(json!({
            "url": "https://bot.example.com/telegram/123_ABC",
            "secret_token": SECRET,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true,"result":true}"#)
        .create_async()
        .await
}

async fn wait_matched(mock: &mockito::Mock) {
    while !mock.matched_async().await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn sent_text(text: &str) -> Matcher {
    Matcher::PartialJson(json!({ "chat_id": "42", "text": text }))
}

// ── Scenario ─────────────────────────────────────────────────────────

#[tokio::test]
async fn name_capture_then_chat_turn_is_replied_and_logged() {
    timeout(TEST_TIMEOUT, async {
        let mut telegram = mockito::Server::new_async().await;
        let set_webhook = mock_set_webhook(&mut telegram).await;
        let greeted = telegram
            .mock("POST", "/bot123:ABC/sendMessage")
            .match_body(sent_text(&greeting("Hello")))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;
        let answered = telegram
            .mock("POST", "/bot123:ABC/sendMessage")
            .match_body(sent_text("4"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        let h = start_relay(&telegram).await;
        wait_matched(&set_webhook).await;

        assert_eq!(h.deliver(&update(1, 42, "Hello")).await, 200);
        // Let the name capture land before the follow-up.
        wait_matched(&greeted).await;
        assert_eq!(h.store.count().await.unwrap(), 0);

        assert_eq!(h.deliver(&update(2, 42, "What is 2+2?")).await, 200);
        h.wait_for_records(1).await;
        wait_matched(&answered).await;

        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 1);
        let records = h.store.list(None, SortOrder::Asc).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, "42");
        assert_eq!(records[0].username, "Hello");
        assert_eq!(records[0].message, "What is 2+2?");
        assert_eq!(records[0].bot_reply, "4");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn wrong_secret_is_rejected_and_nothing_happens() {
    timeout(TEST_TIMEOUT, async {
        let mut telegram = mockito::Server::new_async().await;
        let _set_webhook = mock_set_webhook(&mut telegram).await;
        let send = telegram
            .mock("POST", "/bot123:ABC/sendMessage")
            .expect(0)
            .create_async()
            .await;

        let h = start_relay(&telegram).await;
        let status = h
            .http
            .post(format!("{}/telegram/123_ABC", h.base))
            .header(SECRET_HEADER, "nope")
            .json(&update(1, 42, "Hello"))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, 401);

        tokio::time::sleep(Duration::from_millis(100)).await;
        send.assert_async().await;
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn duplicate_delivery_produces_two_records_and_csv_rows() {
    timeout(TEST_TIMEOUT, async {
        let mut telegram = mockito::Server::new_async().await;
        let _set_webhook = mock_set_webhook(&mut telegram).await;
        let _send = telegram
            .mock("POST", "/bot123:ABC/sendMessage")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        let h = start_relay(&telegram).await;
        h.deliver(&update(1, 42, "Amina")).await;
        let ping = update(2, 42, "ping");
        h.deliver(&ping).await;
        h.deliver(&ping).await;
        h.wait_for_records(2).await;

        let resp = h
            .http
            .get(format!("{}/export_csv", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()["content-type"].to_str().unwrap(),
            "text/csv; charset=utf-8"
        );
        let body = resp.text().await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Username,User Message,Bot Reply,Timestamp");
        assert!(lines[1].starts_with("Amina,ping,you said: ping,"));
        assert!(lines[2].starts_with("Amina,ping,you said: ping,"));

        let page = h
            .http
            .get(format!("{}/messages?limit=1", h.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(page.matches("<li>").count(), 1);
        assert!(page.contains("(Amina, "));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn liveness_is_served_alongside_webhook() {
    timeout(TEST_TIMEOUT, async {
        let mut telegram = mockito::Server::new_async().await;
        let _set_webhook = mock_set_webhook(&mut telegram).await;

        let h = start_relay(&telegram).await;
        let body = h
            .http
            .get(format!("{}/", h.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "🤖 AI Bot is running!");
    })
    .await
    .expect("test timed out");
}
