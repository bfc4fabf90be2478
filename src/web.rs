//! HTTP endpoints for the contact API.
//!
//! Callers identify themselves with HTTP Basic auth; only the username is
//! used to look up the principal.
use crate::authz::decision::{decide, Decision};
use crate::authz::errors::AuthzError;
use crate::authz::types::{Principal, Resource};
use crate::authz::{self, AuthzContext};
use crate::contacts;
use crate::entities::{contact, user};
use crate::errors::AppError;
use crate::settings::Settings;
use crate::storage::{self, ContactInput};
use axum::body::Body;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64ct::{Base64, Encoding};
use miette::IntoDiagnostic;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub authz: Arc<AuthzContext>,
}

/// Failures a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    MissingCredentials,
    UnknownUser,
    ContactNotFound,
    Forbidden,
    Authz(AuthzError),
    Internal(AppError),
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError::Internal(e)
    }
}

impl From<AuthzError> for ApiError {
    fn from(e: AuthzError) -> Self {
        ApiError::Authz(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingCredentials => {
                let mut resp = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Not authenticated"})),
                )
                    .into_response();
                resp.headers_mut().insert(
                    axum::http::header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"contacts\""),
                );
                return resp;
            }
            ApiError::UnknownUser => (StatusCode::NOT_FOUND, "User not found"),
            ApiError::ContactNotFound => (StatusCode::NOT_FOUND, "Contact not found"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Unauthorized"),
            ApiError::Authz(e) => return e.into_response(),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

/// The stored user behind the request, plus the principal sent to the PDP.
pub struct CurrentUser {
    pub user: user::Model,
    pub principal: Principal,
}

fn basic_username(parts: &Parts) -> Option<String> {
    let auth_val = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    let b64 = auth_val.strip_prefix("Basic ")?;
    let decoded = Base64::decode_vec(b64).ok()?;
    let s = String::from_utf8(decoded).ok()?;
    let (username, _password) = s.split_once(':')?;
    Some(username.to_string())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let username = basic_username(parts).ok_or(ApiError::MissingCredentials)?;
        let user = storage::get_user_by_username(&state.db, &username)
            .await?
            .ok_or(ApiError::UnknownUser)?;
        let principal = storage::principal_for(&user);
        Ok(CurrentUser { user, principal })
    }
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );
    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/contacts", get(list_contacts))
        .route("/contacts/new", post(create_contact))
        .route(
            "/contacts/{id}",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: &Settings, state: AppState) -> miette::Result<()> {
    let addr: SocketAddr = settings
        .bind_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Contact API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutting down");
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn authorize(
    state: &AppState,
    action: &str,
    current: &CurrentUser,
    resource: &Resource,
) -> Result<(), ApiError> {
    let ctx = &state.authz;
    match decide(
        ctx.boundary.as_ref(),
        action,
        &current.principal,
        resource,
        ctx.timeout,
    )
    .await
    {
        Decision::Allow => Ok(()),
        Decision::Deny(_) => Err(ApiError::Forbidden),
    }
}

async fn load_contact(state: &AppState, id: i32) -> Result<contact::Model, ApiError> {
    storage::get_contact(&state.db, id)
        .await?
        .ok_or(ApiError::ContactNotFound)
}

async fn list_contacts(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<Value>>, ApiError> {
    let rows = authz::list_authorized(
        &state.authz,
        &state.db,
        contact::Entity::find(),
        &current.principal,
        "read",
        &contacts::list_projection(),
    )
    .await?;
    Ok(Json(rows))
}

async fn get_contact(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<contact::Model>, ApiError> {
    let model = load_contact(&state, id).await?;
    authorize(&state, "read", &current, &contacts::contact_resource(&model)).await?;
    Ok(Json(model))
}

async fn create_contact(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<ContactInput>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, "create", &current, &contacts::new_contact_resource()).await?;
    let model = storage::create_contact(&state.db, current.user.id, input).await?;
    tracing::info!(contact = model.id, user = %current.user.username, "Created contact");
    Ok(Json(json!({"result": "Created contact", "contact": model})))
}

async fn update_contact(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
    Json(input): Json<ContactInput>,
) -> Result<Json<Value>, ApiError> {
    let model = load_contact(&state, id).await?;
    authorize(&state, "update", &current, &contacts::contact_resource(&model)).await?;
    let model = storage::update_contact(&state.db, model, input).await?;
    Ok(Json(json!({"result": "Updated contact", "contact": model})))
}

async fn delete_contact(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let model = load_contact(&state, id).await?;
    authorize(&state, "delete", &current, &contacts::contact_resource(&model)).await?;
    if !storage::delete_contact(&state.db, id).await? {
        return Err(ApiError::ContactNotFound);
    }
    Ok(Json(json!({"result": format!("Contact {id} deleted")})))
}
