//! PdpClient against an in-process fake PDP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use plangate::authz::boundary::{PdpClient, PolicyBoundary};
use plangate::authz::decision::{decide, Decision, DenyReason};
use plangate::authz::errors::{BoundaryError, CompileError};
use plangate::authz::plan::{ComparisonOp, LogicalOp, PlanNode};
use plangate::authz::types::{AttrValue, Literal, Principal, Resource};
use serde_json::{json, Value};

#[derive(Clone)]
struct FakePdp {
    filter: Value,
    delay: Duration,
    seen: Arc<Mutex<Vec<Value>>>,
}

async fn plan_resources(State(pdp): State<FakePdp>, Json(body): Json<Value>) -> Json<Value> {
    tokio::time::sleep(pdp.delay).await;
    pdp.seen.lock().unwrap().push(body);
    Json(json!({ "requestId": "1", "filter": pdp.filter }))
}

async fn check_resources(State(pdp): State<FakePdp>, Json(body): Json<Value>) -> Json<Value> {
    tokio::time::sleep(pdp.delay).await;
    let admin = body["principal"]["roles"]
        .as_array()
        .map(|roles| roles.iter().any(|r| r == "admin"))
        .unwrap_or(false);
    let action = body["resources"][0]["actions"][0].as_str().unwrap().to_string();
    let effect = if admin { "EFFECT_ALLOW" } else { "EFFECT_DENY" };
    pdp.seen.lock().unwrap().push(body);
    Json(json!({
        "results": [{
            "resource": { "id": "1", "kind": "contact" },
            "actions": { action: effect }
        }]
    }))
}

async fn spawn_pdp(filter: Value, delay: Duration) -> (String, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = FakePdp {
        filter,
        delay,
        seen: seen.clone(),
    };
    let app = Router::new()
        .route("/api/plan/resources", post(plan_resources))
        .route("/api/check/resources", post(check_resources))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn sarah() -> Principal {
    Principal::new("3")
        .with_role("user")
        .with_attr("department", "Sales")
}

#[tokio::test]
async fn test_conditional_plan_is_decoded() {
    let filter = json!({
        "kind": "KIND_CONDITIONAL",
        "condition": {
            "expression": {
                "operator": "or",
                "operands": [
                    { "expression": { "operator": "eq", "operands": [
                        { "variable": "request.resource.attr.owner_id" },
                        { "value": "3" }
                    ]}},
                    { "expression": { "operator": "eq", "operands": [
                        { "variable": "request.resource.attr.department" },
                        { "value": "Sales" }
                    ]}}
                ]
            }
        }
    });
    let (base, seen) = spawn_pdp(filter, Duration::ZERO).await;
    let client = PdpClient::new(&base, Duration::from_secs(2)).unwrap();

    let plan = client.plan_resources("read", &sarah(), "contact").await.unwrap();
    assert_eq!(plan.action, "read");
    assert_eq!(plan.resource_kind, "contact");
    let PlanNode::Logical { op, children } = &plan.root else {
        panic!("expected a logical node, got {:?}", plan.root);
    };
    assert_eq!(*op, LogicalOp::Or);
    assert_eq!(
        children[0],
        PlanNode::comparison(
            ComparisonOp::Eq,
            "request.resource.attr.owner_id",
            Literal::Text("3".into())
        )
    );

    let request = seen.lock().unwrap()[0].clone();
    assert_eq!(request["action"], "read");
    assert_eq!(request["resource"]["kind"], "contact");
    assert_eq!(request["principal"]["id"], "3");
    assert_eq!(request["principal"]["roles"], json!(["user"]));
    assert_eq!(request["principal"]["attr"]["department"], "Sales");
}

#[tokio::test]
async fn test_constant_plans() {
    let (base, _) = spawn_pdp(json!({"kind": "KIND_ALWAYS_DENIED"}), Duration::ZERO).await;
    let client = PdpClient::new(&base, Duration::from_secs(2)).unwrap();
    let plan = client.plan_resources("read", &sarah(), "contact").await.unwrap();
    assert_eq!(plan.root, PlanNode::AlwaysDeny);

    let (base, _) = spawn_pdp(json!({"kind": "KIND_ALWAYS_ALLOWED"}), Duration::ZERO).await;
    let client = PdpClient::new(&format!("{base}/"), Duration::from_secs(2)).unwrap();
    let plan = client.plan_resources("read", &sarah(), "contact").await.unwrap();
    assert_eq!(plan.root, PlanNode::AlwaysAllow);
}

#[tokio::test]
async fn test_malformed_plan_is_reported_as_plan_error() {
    let (base, _) = spawn_pdp(json!({"kind": "KIND_SOMETHING_NEW"}), Duration::ZERO).await;
    let client = PdpClient::new(&base, Duration::from_secs(2)).unwrap();
    let err = client
        .plan_resources("read", &sarah(), "contact")
        .await
        .unwrap_err();
    assert!(matches!(err, BoundaryError::Plan(CompileError::MalformedPlan(_))));
}

#[tokio::test]
async fn test_check_sends_resource_attributes() {
    let (base, seen) = spawn_pdp(json!({"kind": "KIND_ALWAYS_DENIED"}), Duration::ZERO).await;
    let client = PdpClient::new(&base, Duration::from_secs(2)).unwrap();

    let mut resource = Resource::new("contact", "1");
    resource.attrs.insert("owner_id".into(), AttrValue::Int(2));
    resource.attrs.insert("is_active".into(), AttrValue::Bool(true));

    assert!(!client.is_allowed("update", &sarah(), &resource).await.unwrap());
    let admin = Principal::new("1").with_role("admin");
    assert!(client.is_allowed("update", &admin, &resource).await.unwrap());

    let request = seen.lock().unwrap()[0].clone();
    let sent = &request["resources"][0];
    assert_eq!(sent["actions"], json!(["update"]));
    assert_eq!(sent["resource"]["kind"], "contact");
    assert_eq!(sent["resource"]["id"], "1");
    assert_eq!(sent["resource"]["attr"]["owner_id"], 2);
    assert_eq!(sent["resource"]["attr"]["is_active"], true);
}

#[tokio::test]
async fn test_unreachable_pdp_is_transport_error() {
    // Bind and drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = PdpClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = client
        .plan_resources("read", &sarah(), "contact")
        .await
        .unwrap_err();
    assert!(matches!(err, BoundaryError::Transport(_)));
}

#[tokio::test]
async fn test_slow_pdp_denies() {
    let (base, _) = spawn_pdp(
        json!({"kind": "KIND_ALWAYS_ALLOWED"}),
        Duration::from_millis(500),
    )
    .await;
    let client = PdpClient::new(&base, Duration::from_millis(50)).unwrap();
    let admin = Principal::new("1").with_role("admin");

    let decision = decide(
        &client,
        "read",
        &admin,
        &Resource::new("contact", "1"),
        Duration::from_millis(50),
    )
    .await;
    assert_eq!(decision, Decision::Deny(DenyReason::BoundaryUnavailable));
}
