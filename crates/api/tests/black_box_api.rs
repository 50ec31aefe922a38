use std::collections::BTreeMap;
use std::sync::Arc;

use ledgergate_ai::{ClassifierProposal, ClassifierQuestion, MappedRow, ScriptedClassifier};
use ledgergate_api::app::{build_app, services};
use ledgergate_infra::EngineConfig;
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(classifier: ScriptedClassifier) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let services = services::build_services_with(EngineConfig::default(), Arc::new(classifier))
            .expect("failed to build engine");
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("x-actor", "ana")
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("x-actor", "ana")
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Part `PN-X`, shelf `A`, vault `V1`.
    async fn seed_catalog(&self) {
        let (s, _) = self
            .post(
                "/catalog/parts",
                json!({ "code": "PN-X", "description": "fibre patch cord", "unit": "unit" }),
            )
            .await;
        assert_eq!(s, StatusCode::CREATED);
        for (code, kind) in [("A", "shelf"), ("V1", "vault")] {
            let (s, _) = self
                .post(
                    "/catalog/locations",
                    json!({ "code": code, "name": format!("location {code}"), "kind": kind }),
                )
                .await;
            assert_eq!(s, StatusCode::CREATED);
        }
    }

    async fn stock(&self, quantity: i64) {
        let (s, body) = self
            .post(
                "/movements",
                json!({
                    "kind": "entry",
                    "part_number": "PN-X",
                    "quantity": quantity,
                    "to_location": "A",
                    "confidence": 0.95,
                }),
            )
            .await;
        assert_eq!(s, StatusCode::CREATED, "{body}");
        assert_eq!(body["status"], "autonomous");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_needs_no_actor_but_everything_else_does() {
    let server = TestServer::spawn(ScriptedClassifier::default()).await;

    let res = server.client.get(format!("{}/health", server.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .client
        .get(format!("{}/catalog/parts", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_actor");
}

#[tokio::test]
async fn reservation_blocks_an_oversized_exit_until_cancelled() {
    let server = TestServer::spawn(ScriptedClassifier::default()).await;
    server.seed_catalog().await;
    server.stock(100).await;

    let (s, reservation) = server
        .post(
            "/reservations",
            json!({ "part_number": "PN-X", "location": "A", "quantity": 30, "project": "PRJ-7" }),
        )
        .await;
    assert_eq!(s, StatusCode::CREATED);
    let (_, balance) = server.get("/balances/PN-X/A").await;
    assert_eq!(balance["available"], 70);

    let (s, err) = server
        .post(
            "/movements",
            json!({
                "kind": "exit",
                "part_number": "PN-X",
                "quantity": 80,
                "from_location": "A",
                "confidence": 0.99,
            }),
        )
        .await;
    assert_eq!(s, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "insufficient_stock");

    let id = reservation["id"].as_str().unwrap();
    let (s, _) = server.post(&format!("/reservations/{id}/cancel"), json!({})).await;
    assert_eq!(s, StatusCode::OK);
    let (_, balance) = server.get("/balances/PN-X/A").await;
    assert_eq!(balance["available"], 100);
}

#[tokio::test]
async fn gated_adjustment_waits_for_a_human() {
    let server = TestServer::spawn(ScriptedClassifier::default()).await;
    server.seed_catalog().await;
    server.stock(10).await;

    let (s, submitted) = server
        .post(
            "/movements",
            json!({
                "kind": "adjustment",
                "part_number": "PN-X",
                "quantity": -2,
                "to_location": "A",
                "confidence": 0.99,
                "assignee": "supervisor",
            }),
        )
        .await;
    assert_eq!(s, StatusCode::ACCEPTED, "{submitted}");
    assert_eq!(submitted["status"], "pending_hil");
    let task_id = submitted["task_id"].as_str().unwrap().to_string();

    let (_, tasks) = server.get("/hil-tasks?status=pending&assignee=supervisor").await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);

    let (s, _) = server
        .post(
            &format!("/hil-tasks/{task_id}/resolve"),
            json!({ "decision": "reject", "comment": "recount first" }),
        )
        .await;
    assert_eq!(s, StatusCode::OK);

    let (s, _) = server
        .post(&format!("/hil-tasks/{task_id}/resolve"), json!({ "decision": "approve" }))
        .await;
    assert_eq!(s, StatusCode::CONFLICT);

    let (s, outcome) = server.get(&format!("/hil-tasks/{task_id}/outcome")).await;
    assert_eq!(s, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(outcome["error"], "policy_rejection");

    let (_, balance) = server.get("/balances/PN-X/A").await;
    assert_eq!(balance["quantity"], 10);

    let (_, audit) = server.get("/audit?action=task.rejected").await;
    assert_eq!(audit.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn import_session_negotiates_then_executes() {
    let rows = vec![MappedRow {
        part_number: "PN-X".into(),
        location: "A".into(),
        quantity: 25,
        serial: None,
    }];
    let classifier = ScriptedClassifier::new(vec![
        ClassifierProposal {
            questions: vec![
                ClassifierQuestion {
                    id: "q1".into(),
                    prompt: "Which column is the location?".into(),
                    field: Some("location".into()),
                    options: vec![],
                },
                ClassifierQuestion {
                    id: "q2".into(),
                    prompt: "Skip the header row?".into(),
                    field: None,
                    options: vec!["yes".into(), "no".into()],
                },
            ],
            field_confidences: BTreeMap::from([("location".into(), 0.55), ("quantity".into(), 0.55)]),
            rows: rows.clone(),
            ..ClassifierProposal::default()
        },
        ClassifierProposal {
            field_confidences: BTreeMap::from([("location".into(), 0.92), ("quantity".into(), 0.92)]),
            rows,
            ready: true,
            ..ClassifierProposal::default()
        },
    ]);
    let server = TestServer::spawn(classifier).await;
    server.seed_catalog().await;

    let (s, session) = server
        .post("/import-sessions", json!({ "file_ref": "uploads/count.csv", "schema": "loc;qty" }))
        .await;
    assert_eq!(s, StatusCode::CREATED);
    assert_eq!(session["state"], "questions_pending");
    let id = session["id"].as_str().unwrap().to_string();

    let (s, _) = server.post(&format!("/import-sessions/{id}/execute"), json!({})).await;
    assert_eq!(s, StatusCode::CONFLICT);

    let (s, session) = server
        .post(
            &format!("/import-sessions/{id}/answers"),
            json!({ "answers": { "q1": "column B", "q2": "yes" }, "expected_round": 1 }),
        )
        .await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(session["state"], "ready_for_processing");

    let (s, done) = server.post(&format!("/import-sessions/{id}/execute"), json!({})).await;
    assert_eq!(s, StatusCode::OK, "{done}");
    assert_eq!(done["outcome"]["status"], "autonomous");

    let (_, available) = server.get("/parts/PN-X/available").await;
    assert_eq!(available["available"], 25);
}

#[tokio::test]
async fn bad_ids_and_unknown_records() {
    let server = TestServer::spawn(ScriptedClassifier::default()).await;

    let (s, _) = server.get("/hil-tasks/not-a-uuid").await;
    assert_eq!(s, StatusCode::BAD_REQUEST);

    let (s, _) = server.get("/reservations/0190a5b2-7c3e-7000-8000-000000000000").await;
    assert_eq!(s, StatusCode::NOT_FOUND);

    let (s, _) = server.get("/balances/PN-NOPE/A").await;
    assert_eq!(s, StatusCode::NOT_FOUND);
}
