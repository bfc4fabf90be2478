use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use plangate::authz::boundary::PolicyBoundary;
use plangate::authz::diagnostics::NoDiagnostics;
use plangate::authz::errors::BoundaryError;
use plangate::authz::plan::{ComparisonOp, Plan, PlanNode};
use plangate::authz::types::{Literal, Principal, Resource};
use plangate::authz::AuthzContext;
use plangate::contacts;

pub fn attr(name: &str) -> String {
    format!("request.resource.attr.{name}")
}

/// In-process stand-in for the demo contact policy:
/// - `admin` may do anything
/// - `user` may read contacts they own or that belong to their department
/// - `user` may create, and update or delete contacts they own
pub struct DemoPolicy;

impl DemoPolicy {
    fn owner_plan(principal: &Principal) -> PlanNode {
        PlanNode::comparison(
            ComparisonOp::Eq,
            attr("owner_id"),
            Literal::Text(principal.id.clone()),
        )
    }

    fn node_for(action: &str, principal: &Principal) -> PlanNode {
        if principal.roles.contains("admin") {
            return PlanNode::AlwaysAllow;
        }
        if !principal.roles.contains("user") {
            return PlanNode::AlwaysDeny;
        }
        match action {
            "create" => PlanNode::AlwaysAllow,
            "read" => {
                let department = principal
                    .attrs
                    .get("department")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                PlanNode::or(vec![
                    Self::owner_plan(principal),
                    PlanNode::comparison(
                        ComparisonOp::Eq,
                        attr("department"),
                        Literal::Text(department),
                    ),
                ])
            }
            "update" | "delete" => Self::owner_plan(principal),
            _ => PlanNode::AlwaysDeny,
        }
    }
}

#[async_trait]
impl PolicyBoundary for DemoPolicy {
    async fn plan_resources(
        &self,
        action: &str,
        principal: &Principal,
        resource_kind: &str,
    ) -> Result<Plan, BoundaryError> {
        Ok(Plan::new(action, resource_kind, Self::node_for(action, principal)))
    }

    async fn is_allowed(
        &self,
        action: &str,
        principal: &Principal,
        resource: &Resource,
    ) -> Result<bool, BoundaryError> {
        // Point checks only see contact columns, so reads fall back to ownership.
        let node = match Self::node_for(action, principal) {
            PlanNode::Logical { .. } => Self::owner_plan(principal),
            other => other,
        };
        let attrs: BTreeMap<_, _> = resource
            .attrs
            .iter()
            .map(|(k, v)| (attr(k), v.clone()))
            .collect();
        Ok(node.evaluate(&attrs)?)
    }
}

/// Returns the same plan for every request and allows every point check.
pub struct FixedPlan(pub PlanNode);

#[async_trait]
impl PolicyBoundary for FixedPlan {
    async fn plan_resources(
        &self,
        action: &str,
        _principal: &Principal,
        resource_kind: &str,
    ) -> Result<Plan, BoundaryError> {
        Ok(Plan::new(action, resource_kind, self.0.clone()))
    }

    async fn is_allowed(
        &self,
        _action: &str,
        _principal: &Principal,
        _resource: &Resource,
    ) -> Result<bool, BoundaryError> {
        Ok(true)
    }
}

/// A PDP that is down.
pub struct FailingBoundary;

#[async_trait]
impl PolicyBoundary for FailingBoundary {
    async fn plan_resources(
        &self,
        _action: &str,
        _principal: &Principal,
        _resource_kind: &str,
    ) -> Result<Plan, BoundaryError> {
        Err(BoundaryError::Status(503))
    }

    async fn is_allowed(
        &self,
        _action: &str,
        _principal: &Principal,
        _resource: &Resource,
    ) -> Result<bool, BoundaryError> {
        Err(BoundaryError::Status(503))
    }
}

/// A PDP that accepts the request and never answers.
pub struct Hanging;

#[async_trait]
impl PolicyBoundary for Hanging {
    async fn plan_resources(
        &self,
        _action: &str,
        _principal: &Principal,
        _resource_kind: &str,
    ) -> Result<Plan, BoundaryError> {
        std::future::pending().await
    }

    async fn is_allowed(
        &self,
        _action: &str,
        _principal: &Principal,
        _resource: &Resource,
    ) -> Result<bool, BoundaryError> {
        std::future::pending().await
    }
}

pub fn context(boundary: impl PolicyBoundary + 'static) -> AuthzContext {
    AuthzContext {
        attributes: contacts::schema_map().expect("contact schema"),
        resource_kind: contacts::RESOURCE_KIND.to_string(),
        boundary: Arc::new(boundary),
        timeout: Duration::from_millis(500),
        diagnostics: Arc::new(NoDiagnostics),
    }
}
