pub mod attributes;
pub mod boundary;
pub mod compiler;
pub mod decision;
pub mod diagnostics;
pub mod errors;
pub mod executor;
pub mod plan;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectionTrait, EntityTrait, Select};
use serde_json::Value;

use attributes::{AttributeMap, ColumnRef};
use boundary::PolicyBoundary;
use diagnostics::QueryDiagnostics;
use errors::{AuthzError, BoundaryError, ExecutionError};
use plan::Plan;
use types::Principal;

/// Everything needed to authorize queries against one resource kind.
///
/// Immutable after construction and shared between requests.
pub struct AuthzContext {
    pub attributes: AttributeMap,
    pub resource_kind: String,
    pub boundary: Arc<dyn PolicyBoundary>,
    pub timeout: Duration,
    pub diagnostics: Arc<dyn QueryDiagnostics>,
}

impl AuthzContext {
    /// Fetch a plan, bounded by the configured timeout.
    pub async fn plan(&self, principal: &Principal, action: &str) -> Result<Plan, BoundaryError> {
        let call = self
            .boundary
            .plan_resources(action, principal, &self.resource_kind);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BoundaryError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Return the rows of `query` that `principal` may apply `action` to.
///
/// A plan the PDP cannot produce denies the request; a plan that cannot be
/// compiled is reported as [`AuthzError::Compile`]. No query runs in either
/// case.
pub async fn list_authorized<E, C>(
    ctx: &AuthzContext,
    db: &C,
    query: Select<E>,
    principal: &Principal,
    action: &str,
    projection: &[ColumnRef],
) -> Result<Vec<Value>, AuthzError>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let plan = match ctx.plan(principal, action).await {
        Ok(plan) => plan,
        Err(BoundaryError::Plan(e)) => return Err(AuthzError::Compile(e)),
        Err(e) => {
            tracing::warn!(action, principal = %principal.id, error = %e, "Policy boundary unavailable");
            return Err(ExecutionError::PolicyBoundaryUnavailable(e).into());
        }
    };
    ctx.diagnostics.on_plan(&plan);

    let compiled = compiler::compile(&plan, &ctx.attributes)?;
    let rows = executor::execute(db, query, &compiled, projection, ctx.diagnostics.as_ref()).await?;
    Ok(rows)
}
