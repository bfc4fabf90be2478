use crate::authz::plan::Plan;

/// Hook for observing plans and the SQL they compile to.
pub trait QueryDiagnostics: Send + Sync {
    fn on_plan(&self, _plan: &Plan) {}
    fn on_sql(&self, _sql: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl QueryDiagnostics for NoDiagnostics {}

/// Logs plan JSON and SQL text at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl QueryDiagnostics for TracingDiagnostics {
    fn on_plan(&self, plan: &Plan) {
        match serde_json::to_string(plan) {
            Ok(json) => tracing::debug!(plan = %json, "Decision plan"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize decision plan"),
        }
    }

    fn on_sql(&self, sql: &str) {
        tracing::debug!(%sql, "Authorized query");
    }
}
