use std::time::Duration;

use crate::authz::boundary::PolicyBoundary;
use crate::authz::errors::{BoundaryError, ExecutionError};
use crate::authz::types::{Principal, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The policy said no.
    Policy,
    /// The policy boundary could not be asked; treated as a no.
    BoundaryUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Point decision for a single, fully materialized resource.
///
/// Never fails: a boundary error or a timeout yields
/// `Deny(BoundaryUnavailable)`.
pub async fn decide(
    boundary: &dyn PolicyBoundary,
    action: &str,
    principal: &Principal,
    resource: &Resource,
    timeout: Duration,
) -> Decision {
    let outcome = tokio::time::timeout(timeout, boundary.is_allowed(action, principal, resource))
        .await
        .unwrap_or_else(|_| Err(BoundaryError::Timeout(timeout.as_millis() as u64)));

    match outcome {
        Ok(true) => Decision::Allow,
        Ok(false) => {
            tracing::info!(
                action,
                principal = %principal.id,
                resource = %resource.id,
                "Policy denied request"
            );
            Decision::Deny(DenyReason::Policy)
        }
        Err(e) => {
            let err = ExecutionError::PolicyBoundaryUnavailable(e);
            tracing::warn!(action, principal = %principal.id, error = %err, "Denying request");
            Decision::Deny(DenyReason::BoundaryUnavailable)
        }
    }
}
