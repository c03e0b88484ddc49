use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use flagdesk::config::AppConfig;
use flagdesk::logic::ConstraintUpdate;
use flagdesk::{build_app, FlagSession, MemoryStore, Operation, ReturnVariant, SegmentSession};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// Drives the router in-process, one request at a time
struct TestClient {
    app: Router,
}

impl TestClient {
    fn new() -> Self {
        let app = build_app(Arc::new(MemoryStore::new()), &AppConfig::default());
        Self { app }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, path: &str, json: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.send(Request::delete(path).body(Body::empty()).unwrap())
            .await
    }
}

#[tokio::test]
async fn test_health_and_operations() {
    let client = TestClient::new();

    let (status, body) = client.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = client.get("/operations").await;
    assert_eq!(status, StatusCode::OK);
    let operations = body.as_array().unwrap();
    assert_eq!(operations.len(), 23);
    assert_eq!(operations[0]["name"], "ONE_OF");
    assert!(operations
        .iter()
        .any(|op| op["name"] == "IS_IN_SEGMENT" && op["label"].is_string()));
}

#[tokio::test]
async fn test_cast_values() {
    let client = TestClient::new();

    let (_, body) = client.post("/values/cast", json!({ "value": "42" })).await;
    assert_eq!(body["value"], json!(42));

    let (_, body) = client.post("/values/cast", json!({ "value": "true" })).await;
    assert_eq!(body["value"], json!(true));

    let (_, body) = client
        .post("/values/cast", json!({ "value": 7, "type": "string" }))
        .await;
    assert_eq!(body["value"], json!("7"));

    let (_, body) = client
        .post("/values/cast", json!({ "value": "", "type": "number" }))
        .await;
    assert_eq!(body["value"], json!(0));
}

#[tokio::test]
async fn test_flag_lifecycle() {
    let client = TestClient::new();

    let (status, body) = client.post("/flags/draft?type=string&variants=3", json!(null)).await;
    assert_eq!(status, StatusCode::OK);
    let mut session: FlagSession = serde_json::from_value(body).unwrap();
    assert!(session.flag.is_new);
    let values: Vec<Value> = session
        .flag
        .variants
        .iter()
        .map(|v| serde_json::to_value(&v.value).unwrap())
        .collect();
    assert_eq!(values, vec![json!("a"), json!("b"), json!("c")]);

    session.set_name("New Checkout");
    session.derive_key_from_name();
    let b = session.flag.variants[1].id.clone();
    let rule_id = session.add_rule();
    session
        .set_return_variant(&rule_id, ReturnVariant::Variant(b))
        .unwrap();
    let cid = session.flag.rules[0].constraints[0].id.clone();
    session
        .update_constraint(
            &rule_id,
            &cid,
            ConstraintUpdate {
                property: Some("plan".to_string()),
                operation: Some(Operation::Exists),
                ..ConstraintUpdate::default()
            },
        )
        .unwrap();

    let (status, body) = client
        .post("/flags/save", serde_json::to_value(&session).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["report"]["created"], 5);
    let flag_id = body["report"]["id"].as_str().unwrap().to_string();
    let saved: FlagSession = serde_json::from_value(body["session"].clone()).unwrap();
    assert!(!saved.flag.is_new);
    assert!(saved.changes.is_empty());

    let (status, body) = client.get("/flags?search=CHECKOUT").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["key"], "new.checkout");

    let (status, body) = client.get(&format!("/flags/{}", flag_id)).await;
    assert_eq!(status, StatusCode::OK);
    let opened: FlagSession = serde_json::from_value(body).unwrap();
    assert_eq!(opened.flag.id, flag_id);
    assert_eq!(opened.flag.variants.len(), 3);
    assert_eq!(
        opened.flag.rules[0].return_variant,
        ReturnVariant::Variant(saved.flag.variants[1].id.clone())
    );
    assert_eq!(
        opened.flag.default_variant_when_on,
        saved.flag.default_variant_when_on
    );

    let (status, _) = client.delete(&format!("/flags/{}", flag_id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = client.delete(&format!("/flags/{}", flag_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains(&flag_id));
}

#[tokio::test]
async fn test_unbalanced_rollout_is_rejected() {
    let client = TestClient::new();

    let (_, body) = client.post("/flags/draft", json!(null)).await;
    let mut session: FlagSession = serde_json::from_value(body).unwrap();
    session.set_key("half");
    let rule_id = session.add_rule();
    session
        .set_return_variant(&rule_id, ReturnVariant::Rollout)
        .unwrap();
    let on = session.flag.variants[0].id.clone();
    session
        .set_distribution_percentage(&rule_id, &on, 60)
        .unwrap();

    let (status, body) = client
        .post("/flags/save", serde_json::to_value(&session).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("60"));

    let (_, body) = client.get("/flags").await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_draft_is_rejected() {
    let client = TestClient::new();

    let (status, body) = client
        .post("/flags/draft?type=string&variants=1000", json!(null))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("1000"));

    let (status, body) = client
        .post("/flags/draft?type=number&variants=26", json!(null))
        .await;
    assert_eq!(status, StatusCode::OK);
    let session: FlagSession = serde_json::from_value(body).unwrap();
    assert_eq!(session.flag.variants.len(), 26);
}

#[tokio::test]
async fn test_incomplete_constraint_is_rejected() {
    let client = TestClient::new();

    let (_, body) = client.post("/segments/draft", json!(null)).await;
    let mut session: SegmentSession = serde_json::from_value(body).unwrap();
    session.set_name("nobody");
    session.add_rule();

    let (status, body) = client
        .post("/segments/save", serde_json::to_value(&session).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("missing its property"));
    let (_, body) = client.get("/segments").await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_flag_is_not_found() {
    let client = TestClient::new();
    let (status, _) = client.get("/flags/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_segment_lifecycle() {
    let client = TestClient::new();

    let (status, body) = client.post("/segments/draft", json!(null)).await;
    assert_eq!(status, StatusCode::OK);
    let mut session: SegmentSession = serde_json::from_value(body).unwrap();
    session.set_name("beta testers");
    let rule_id = session.add_rule();
    let cid = session.segment.rules[0].constraints[0].id.clone();
    session
        .update_constraint(
            &rule_id,
            &cid,
            ConstraintUpdate {
                property: Some("email".to_string()),
                operation: Some(Operation::EndsWith),
                values: Some(vec!["@beta.example".into()]),
                ..ConstraintUpdate::default()
            },
        )
        .unwrap();

    let (status, body) = client
        .post("/segments/save", serde_json::to_value(&session).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["report"]["created"], 2);
    let segment_id = body["report"]["id"].as_str().unwrap().to_string();

    let (_, body) = client.get("/segments").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "beta testers");

    let (status, body) = client.get(&format!("/segments/{}", segment_id)).await;
    assert_eq!(status, StatusCode::OK);
    let opened: SegmentSession = serde_json::from_value(body).unwrap();
    assert_eq!(opened.segment.rules.len(), 1);
    assert_eq!(opened.segment.rules[0].constraints.len(), 1);

    let (status, _) = client.delete(&format!("/segments/{}", segment_id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
