//! HTTP API tests.
//!
//! Each test serves the real router on an ephemeral port over a fresh
//! SQLite database and talks to it with reqwest.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use tenant_rag::config::Config;
use tenant_rag::engine::Engine;
use tenant_rag::hybrid::HybridOrchestrator;
use tenant_rag::identity::IdentityKey;
use tenant_rag::server::{router, AppState};
use tenant_rag_core::models::Role;

// ─── Helpers ────────────────────────────────────────────────────────

struct TestServer {
    base: String,
    key: IdentityKey,
    client: reqwest::Client,
    _tmp: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::minimal(tmp.path().join("trag.sqlite"));
        let engine = Arc::new(Engine::open(&cfg).await.unwrap());
        engine.register_tenant("acme").await.unwrap();
        engine.register_tenant("globex").await.unwrap();

        let key = IdentityKey::new("server-test-secret", cfg.identity.issuer.clone(), 60);
        let orchestrator = Arc::new(HybridOrchestrator::new(engine, None));
        let state = AppState::new(orchestrator, key.clone(), &cfg).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let server = Self {
            base: format!("http://{}", addr),
            key,
            client: reqwest::Client::new(),
            _tmp: tmp,
        };
        server.wait_until_ready().await;
        server
    }

    async fn wait_until_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self.client.get(format!("{}/health", self.base)).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready within 5 seconds");
    }

    fn token(&self, user: &str, tenant: &str, role: &str) -> String {
        self.key
            .mint(user, tenant, &Role::parse(role).unwrap())
            .unwrap()
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}{}", self.base, path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

fn ingest_body(tenant: &str, doc_id: &str, text: &str, roles: &[&str]) -> Value {
    json!({
        "tenant_id": tenant,
        "doc_id": doc_id,
        "text": text,
        "allowed_roles": roles,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let resp = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["embedding"], "disabled");
    assert_eq!(body["llm"], "disabled");
    assert_eq!(body["remote"], false);
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post("/v1/query", None, json!({ "query": "leave" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let forged = IdentityKey::new("other-secret", "tenant-rag", 60)
        .mint("e-1", "acme", &Role::parse("employee").unwrap())
        .unwrap();
    let (status, _) = server
        .post("/v1/query", Some(&forged), json!({ "query": "leave" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_employee_cannot_upload() {
    let server = TestServer::start().await;
    let token = server.token("e-1", "acme", "employee");
    let (status, body) = server
        .post(
            "/v1/ingest",
            Some(&token),
            ingest_body("acme", "handbook", "Office opens at nine.", &["employee"]),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn test_upload_into_other_tenant_is_forbidden() {
    let server = TestServer::start().await;
    let token = server.token("h-1", "acme", "hr");
    let (status, _) = server
        .post(
            "/v1/ingest",
            Some(&token),
            ingest_body("globex", "handbook", "Office opens at nine.", &["employee"]),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ingest_query_and_audit() {
    let server = TestServer::start().await;
    let hr = server.token("h-1", "acme", "hr");
    let (status, body) = server
        .post(
            "/v1/ingest",
            Some(&hr),
            ingest_body(
                "acme",
                "work_hours",
                "Core working hours are 10:00 to 16:00.\n\nFridays end at 15:00.",
                &["employee", "hr"],
            ),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks_created"], 1);
    assert_eq!(body["degraded"], true);

    let employee = server.token("e-1", "acme", "employee");
    let (status, body) = server
        .post(
            "/v1/query",
            Some(&employee),
            json!({ "query": "what are the working hours", "top_k": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "local");
    assert_eq!(body["degraded"], true);
    assert_eq!(body["provenance"][0]["doc_id"], "work_hours");

    // Audit log is admin-only.
    let (status, _) = server.get("/v1/audit", &employee).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = server.token("a-1", "acme", "admin");
    let (status, body) = server.get("/v1/audit?action=query", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["user_id"], "e-1");
    assert_eq!(records[0]["role"], "employee");

    let (status, body) = server.get("/v1/audit?action=ingest", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = server.get("/v1/audit?action=delete", &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_query_validation_errors() {
    let server = TestServer::start().await;
    let employee = server.token("e-1", "acme", "employee");

    let (status, body) = server
        .post("/v1/query", Some(&employee), json!({ "query": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = server
        .post("/v1/query", Some(&employee), json!({ "query": "leave", "top_k": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .post("/v1/query", Some(&employee), json!({ "nope": true }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let ghost = server.token("e-1", "initech", "employee");
    let (status, body) = server
        .post("/v1/query", Some(&ghost), json!({ "query": "leave" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "unknown_tenant");
}

#[tokio::test]
async fn test_purge_document() {
    let server = TestServer::start().await;
    let hr = server.token("h-1", "acme", "hr");
    server
        .post(
            "/v1/ingest",
            Some(&hr),
            ingest_body("acme", "pto", "Paid time off accrues monthly.", &["employee"]),
        )
        .await;

    let (status, body) = server
        .post("/v1/documents/purge", Some(&hr), json!({ "doc_id": "pto" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks_removed"], 1);

    let employee = server.token("e-1", "acme", "employee");
    let (status, _) = server
        .post("/v1/documents/purge", Some(&employee), json!({ "doc_id": "pto" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_audit_query_text_is_redacted() {
    let server = TestServer::start().await;
    let employee = server.token("e-1", "acme", "employee");
    let (status, _) = server
        .post(
            "/v1/query",
            Some(&employee),
            json!({ "query": "update payroll email to jane.doe@acme.com, phone 555-123-4567" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let admin = server.token("a-1", "acme", "admin");
    let (status, body) = server.get("/v1/audit?action=query", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0]["query_text"],
        "update payroll email to [REDACTED], phone [REDACTED]"
    );
}
