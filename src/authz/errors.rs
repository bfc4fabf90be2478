use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::authz::types::ValueKind;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ResolutionError {
    #[error("Unknown attribute `{0}`")]
    #[diagnostic(
        code(plangate::authz::unknown_attribute),
        help("Every attribute a policy condition references must be declared in the attribute map")
    )]
    UnknownAttribute(String),
}

/// Raised while building an attribute map or join spec at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SchemaError {
    #[error("Related table `{0}` is joined more than once")]
    #[diagnostic(
        code(plangate::authz::ambiguous_join),
        help("Each related table must be reachable through exactly one join path")
    )]
    AmbiguousJoin(String),

    #[error("Join from `{0}` to itself is not allowed")]
    #[diagnostic(code(plangate::authz::cyclic_join))]
    CyclicJoin(String),

    #[error("No join declared for related table `{table}` (needed by `{path}`)")]
    #[diagnostic(
        code(plangate::authz::missing_join),
        help("Add a join entry linking the primary table to `{table}`")
    )]
    MissingJoin { path: String, table: String },

    #[error("Attribute `{0}` is declared twice")]
    #[diagnostic(code(plangate::authz::duplicate_attribute))]
    DuplicateAttribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CompileError {
    #[error("Unresolved attribute `{0}`")]
    #[diagnostic(
        code(plangate::authz::unresolved_attribute),
        help("The policy references an attribute that has no column mapping; access is denied")
    )]
    UnresolvedAttribute(String),

    #[error("Type mismatch on `{path}`: column is {expected}, literal is {found}")]
    #[diagnostic(code(plangate::authz::type_mismatch))]
    TypeMismatch {
        path: String,
        expected: ValueKind,
        found: String,
    },

    #[error("Operator `{op}` is not supported on `{path}`")]
    #[diagnostic(code(plangate::authz::unsupported_operator))]
    UnsupportedOperator { op: String, path: String },

    #[error("Logical `{0}` node has no children")]
    #[diagnostic(
        code(plangate::authz::empty_logical),
        help("A malformed plan is rejected rather than defaulted to allow or deny")
    )]
    EmptyLogicalChildren(String),

    #[error("Malformed plan: {0}")]
    #[diagnostic(code(plangate::authz::malformed_plan))]
    MalformedPlan(String),
}

impl From<ResolutionError> for CompileError {
    fn from(value: ResolutionError) -> Self {
        match value {
            ResolutionError::UnknownAttribute(path) => CompileError::UnresolvedAttribute(path),
        }
    }
}

/// Failure reported by a policy boundary implementation.
#[derive(Debug, Error, Diagnostic)]
pub enum BoundaryError {
    #[error("Policy decision point request failed: {0}")]
    #[diagnostic(code(plangate::authz::pdp_transport))]
    Transport(#[from] reqwest::Error),

    #[error("Policy decision point returned HTTP {0}")]
    #[diagnostic(code(plangate::authz::pdp_status))]
    Status(u16),

    #[error("Unexpected policy decision point response: {0}")]
    #[diagnostic(code(plangate::authz::pdp_response))]
    Response(String),

    #[error("Policy decision point did not answer within {0} ms")]
    #[diagnostic(code(plangate::authz::pdp_timeout))]
    Timeout(u64),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Plan(#[from] CompileError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum ExecutionError {
    #[error("Policy boundary unavailable: {0}")]
    #[diagnostic(
        code(plangate::authz::boundary_unavailable),
        help("Requests are denied while the policy decision point cannot be reached")
    )]
    PolicyBoundaryUnavailable(#[source] BoundaryError),

    #[error("Database error: {0}")]
    #[diagnostic(code(plangate::authz::data_store))]
    DataStore(#[from] sea_orm::DbErr),
}

/// Errors of the list authorization flow.
#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthzError::Compile(_)
            | AuthzError::Execution(ExecutionError::PolicyBoundaryUnavailable(_)) => {
                StatusCode::FORBIDDEN
            }
            AuthzError::Execution(ExecutionError::DataStore(e)) => {
                tracing::error!(error = %e, "Authorized query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            AuthzError::Compile(e) => format!("Unable to determine access: {e}"),
            AuthzError::Execution(ExecutionError::PolicyBoundaryUnavailable(_)) => {
                "Unauthorized".to_string()
            }
            AuthzError::Execution(ExecutionError::DataStore(_)) => {
                "Internal server error".to_string()
            }
        };
        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
