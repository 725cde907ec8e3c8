//! Integration tests for the REST surface.
//!
//! Each test spins up an Axum server on a random port with stub collaborators
//! (no real LLM or SMTP) and exercises the real HTTP contract with reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use replyflow::api::{api_routes, AppState};
use replyflow::approval::TaskManager;
use replyflow::classify::{Classification, Classifier, EmailCategory, InboundEmail, Level, Sentiment};
use replyflow::config::EngineConfig;
use replyflow::dispatch::NullDispatcher;
use replyflow::draft::DraftGenerator;
use replyflow::error::GenerationError;
use replyflow::knowledge::InMemoryKnowledgeStore;
use replyflow::llm::{GenerationBackend, GenerationRequest};
use replyflow::pipeline::ReplyPipeline;
use replyflow::rules::RuleStore;

/// Classifier stub: every email is a high-intent inquiry.
struct StubClassifier;

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _email: &InboundEmail) -> Result<Classification, GenerationError> {
        Ok(Classification {
            category: EmailCategory::Inquiry,
            sentiment: Sentiment::Neutral,
            urgency: Level::High,
            purchase_intent: Level::High,
            purchase_intent_score: 85,
            opportunity_score: 70,
            requires_human_review: false,
        })
    }
}

/// Generation stub: returns a fixed draft, echoes translations.
struct StubBackend;

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn generate(&self, _req: GenerationRequest) -> Result<String, GenerationError> {
        Ok(r#"{"subject": "Re: stub", "body": "stub draft body"}"#.to_string())
    }

    async fn translate(&self, content: &str, target_lang: &str) -> Result<String, GenerationError> {
        Ok(format!("[{target_lang}] {content}"))
    }
}

/// Start a server on a random port, return its base URL.
async fn start_server() -> String {
    let rules = RuleStore::new();
    let backend: Arc<dyn GenerationBackend> = Arc::new(StubBackend);
    let generator = Arc::new(DraftGenerator::new(
        Arc::clone(&backend),
        Arc::new(InMemoryKnowledgeStore::default()),
        &EngineConfig::default(),
    ));
    let dispatcher = Arc::new(NullDispatcher);
    let manager = TaskManager::new(
        Arc::clone(&rules),
        dispatcher.clone(),
        Arc::clone(&generator),
    );
    let pipeline = Arc::new(ReplyPipeline::new(
        Arc::new(StubClassifier),
        Arc::clone(&rules),
        generator,
        Arc::clone(&manager),
        dispatcher,
    ));

    let app = api_routes(AppState {
        pipeline,
        manager,
        rules,
        backend,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

fn inbound_email() -> Value {
    json!({
        "from": "buyer@example.com",
        "subject": "Price for 500 units",
        "body": "Please quote volume pricing.",
        "received_at": Utc::now(),
    })
}

fn inquiry_rule(require_approval: bool) -> Value {
    json!({
        "rule_name": "inquiry default",
        "email_category": "inquiry",
        "require_approval": require_approval,
        "approval_timeout_hours": 24,
        "priority": 10,
    })
}

/// Create a rule and ingest one email; return the created task id.
async fn create_task(client: &reqwest::Client, base: &str) -> String {
    let resp = client
        .post(format!("{base}/rules"))
        .json(&inquiry_rule(true))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{base}/emails"))
        .json(&inbound_email())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["outcome"], "task_created");
    outcome["task"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let base = start_server().await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn rule_crud_roundtrip() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/rules"))
        .json(&inquiry_rule(true))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let rule: Value = resp.json().await.unwrap();
    let id = rule["id"].as_u64().unwrap();
    assert_eq!(rule["counters"]["triggered_count"], 0);

    let resp = client
        .put(format!("{base}/rules/{id}"))
        .json(&json!({
            "rule_name": "renamed",
            "email_category": "inquiry",
            "priority": 3,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["rule_name"], "renamed");

    let rules: Value = client
        .get(format!("{base}/rules"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rules.as_array().unwrap().len(), 1);

    let resp = client
        .delete(format!("{base}/rules/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/rules/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn email_without_rules_is_left_for_manual_handling() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/emails"))
        .json(&inbound_email())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["outcome"], "no_match");
    assert_eq!(outcome["classification"]["category"], "inquiry");
}

#[tokio::test]
async fn ingest_creates_pending_task_with_draft() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let task_id = create_task(&client, &base).await;

    let task: Value = client
        .get(format!("{base}/approval_tasks/{task_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(task["status"], "pending");
    assert_eq!(task["draft"]["body"], "stub draft body");
    assert_eq!(task["original_email"]["from"], "buyer@example.com");

    let tasks: Value = client
        .get(format!("{base}/approval_tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tasks.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn approve_without_smtp_reports_warning_and_no_sent_id() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let task_id = create_task(&client, &base).await;

    let resp = client
        .post(format!(
            "{base}/approval_tasks/{task_id}/approve?approved_by=alice"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["task"]["status"], "approved");
    assert_eq!(outcome["warning"], "NO_SMTP_CONFIG");
    assert!(outcome.get("sent_email_id").is_none());

    // Second approve conflicts and returns the current task state.
    let resp = client
        .post(format!(
            "{base}/approval_tasks/{task_id}/approve?approved_by=bob"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let conflict: Value = resp.json().await.unwrap();
    assert_eq!(conflict["task"]["status"], "approved");
}

#[tokio::test]
async fn reject_then_approve_conflicts() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let task_id = create_task(&client, &base).await;

    let resp = client
        .put(format!(
            "{base}/approval_tasks/{task_id}/reject?rejected_by=bob&reason=off%20brand"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["task"]["status"], "rejected");
    assert_eq!(outcome["task"]["rejection_reason"], "off brand");

    let resp = client
        .post(format!(
            "{base}/approval_tasks/{task_id}/approve?approved_by=alice"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn edit_updates_draft_and_stays_pending() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let task_id = create_task(&client, &base).await;

    let resp = client
        .put(format!("{base}/approval_tasks/{task_id}"))
        .json(&json!({
            "draft_subject": "Re: edited",
            "draft_body": "edited body",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let task: Value = resp.json().await.unwrap();
    assert_eq!(task["status"], "pending");
    assert_eq!(task["draft"]["subject"], "Re: edited");
    assert_eq!(task["draft"]["body"], "edited body");
}

#[tokio::test]
async fn regenerate_replaces_draft_in_place() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let task_id = create_task(&client, &base).await;

    let resp = client
        .post(format!("{base}/approval_tasks/{task_id}/regenerate"))
        .json(&json!({"instruction": "make it shorter"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let task: Value = resp.json().await.unwrap();
    assert_eq!(task["status"], "pending");
    assert_eq!(task["draft"]["body"], "stub draft body");

    // Still exactly one task.
    let tasks: Value = client
        .get(format!("{base}/approval_tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tasks.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_task_id_is_bad_request() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!(
            "{base}/approval_tasks/not-a-uuid/approve?approved_by=alice"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "{base}/approval_tasks/550e8400-e29b-41d4-a716-446655440000"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn translate_passthrough() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/translate"))
        .json(&json!({"content": "hello", "target_lang": "es"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["translated"], "[es] hello");
}
