//! The external policy decision point (PDP).
//!
//! [`PdpClient`] speaks the Cerbos-style JSON API:
//! - `POST /api/plan/resources` returns a `filter` document (see [`Plan::from_filter`])
//! - `POST /api/check/resources` returns an effect per action

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::authz::errors::BoundaryError;
use crate::authz::plan::Plan;
use crate::authz::types::{Principal, Resource};

#[async_trait]
pub trait PolicyBoundary: Send + Sync {
    /// Ask for the conditions under which `principal` may apply `action` to
    /// resources of `resource_kind`.
    async fn plan_resources(
        &self,
        action: &str,
        principal: &Principal,
        resource_kind: &str,
    ) -> Result<Plan, BoundaryError>;

    async fn is_allowed(
        &self,
        action: &str,
        principal: &Principal,
        resource: &Resource,
    ) -> Result<bool, BoundaryError>;
}

const EFFECT_ALLOW: &str = "EFFECT_ALLOW";

#[derive(Debug, Deserialize)]
struct PlanResponse {
    filter: Value,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    results: Vec<CheckResult>,
}

#[derive(Debug, Deserialize)]
struct CheckResult {
    #[serde(default)]
    actions: BTreeMap<String, String>,
}

impl CheckResponse {
    /// Whether the first result grants `action`.
    fn allows(&self, action: &str) -> Result<bool, BoundaryError> {
        let effect = self
            .results
            .first()
            .and_then(|r| r.actions.get(action))
            .ok_or_else(|| {
                BoundaryError::Response(format!("check response has no effect for `{action}`"))
            })?;
        Ok(effect == EFFECT_ALLOW)
    }
}

#[derive(Debug, Clone)]
pub struct PdpClient {
    http: reqwest::Client,
    base_url: String,
}

impl PdpClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, BoundaryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, BoundaryError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BoundaryError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BoundaryError::Response(e.to_string()))
    }
}

#[async_trait]
impl PolicyBoundary for PdpClient {
    async fn plan_resources(
        &self,
        action: &str,
        principal: &Principal,
        resource_kind: &str,
    ) -> Result<Plan, BoundaryError> {
        let body = json!({
            "action": action,
            "principal": principal,
            "resource": { "kind": resource_kind },
        });
        let resp: PlanResponse = self.post("/api/plan/resources", &body).await?;
        Ok(Plan::from_filter(action, resource_kind, &resp.filter)?)
    }

    async fn is_allowed(
        &self,
        action: &str,
        principal: &Principal,
        resource: &Resource,
    ) -> Result<bool, BoundaryError> {
        let body = json!({
            "principal": principal,
            "resources": [{ "actions": [action], "resource": resource }],
        });
        let resp: CheckResponse = self.post("/api/check/resources", &body).await?;
        resp.allows(action)
    }
}
