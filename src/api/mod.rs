//! Demo HTTP surface.
//!
//! Thin handlers over the account flows and the write controller, wired so
//! every gate is exercised end to end: health and registration are open,
//! catalog reads need `items:read`, catalog writes need `items:write`.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::account::Accounts;
use crate::authz::{require_permission, AuthzState};
use crate::errors::GateError;
use crate::occ::{check_precondition, Item, ItemFields, WriteController};
use crate::principal::{PERMISSION_ITEMS_READ, PERMISSION_ITEMS_WRITE};
use crate::validate::Checks;

/// Handler state.
#[derive(Clone)]
pub struct ApiState {
    pub accounts: Accounts,
    pub writes: WriteController,
}

/// Assemble the business router with per-route authorization gates.
pub fn router(state: ApiState, authz: AuthzState) -> Router {
    let read_gate = from_fn_with_state(authz.require(PERMISSION_ITEMS_READ), require_permission);
    let write_gate = from_fn_with_state(authz.require(PERMISSION_ITEMS_WRITE), require_permission);

    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .route("/v1/users", post(register))
        .route("/v1/users/activated", put(activate))
        .route("/v1/tokens/authentication", post(login))
        .route("/v1/items", post(create_item).layer(write_gate.clone()))
        .route("/v1/items/{id}", get(show_item).layer(read_gate))
        .route("/v1/items/{id}", patch(update_item).layer(write_gate))
        .fallback(|| async { GateError::NotFound })
        .with_state(state)
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({
        "status": "available",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct RegisterInput {
    name: String,
    email: String,
    password: String,
}

async fn register(
    State(state): State<ApiState>,
    payload: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<Response, GateError> {
    let Json(input) = payload.map_err(bad_request)?;

    let principal = state
        .accounts
        .register(input.name, input.email, input.password)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "user": principal }))).into_response())
}

#[derive(Deserialize)]
struct ActivateInput {
    token: String,
}

async fn activate(
    State(state): State<ApiState>,
    payload: Result<Json<ActivateInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, GateError> {
    let Json(input) = payload.map_err(bad_request)?;

    let principal = state.accounts.activate(&input.token).await?;
    Ok(Json(json!({ "user": principal })))
}

#[derive(Deserialize)]
struct LoginInput {
    email: String,
    password: String,
}

async fn login(
    State(state): State<ApiState>,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> Result<Response, GateError> {
    let Json(input) = payload.map_err(bad_request)?;

    let credential = state.accounts.login(&input.email, &input.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": credential })),
    )
        .into_response())
}

#[derive(Deserialize)]
struct CreateItemInput {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

async fn create_item(
    State(state): State<ApiState>,
    payload: Result<Json<CreateItemInput>, JsonRejection>,
) -> Result<Response, GateError> {
    let Json(input) = payload.map_err(bad_request)?;

    let mut checks = Checks::new();
    checks.check(!input.name.is_empty(), "name", "must be provided");
    checks.finish()?;

    let item = state
        .writes
        .create(Item::new(input.name, input.tags))
        .await?;

    let location = format!("/v1/items/{}", item.id);
    let mut response = (StatusCode::CREATED, Json(json!({ "item": item }))).into_response();
    response.headers_mut().insert(
        header::LOCATION,
        HeaderValue::from_str(&location).map_err(|_| GateError::Internal("bad location header"))?,
    );
    Ok(response)
}

async fn show_item(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, GateError> {
    let Path(id) = id.map_err(|_| GateError::NotFound)?;

    let item = state.writes.get(id).await?;
    Ok(Json(json!({ "item": item })))
}

#[derive(Deserialize)]
struct UpdateItemInput {
    name: Option<String>,
    tags: Option<Vec<String>>,
}

/// Optimistically concurrent partial update. The caller's view of the
/// version comes either from the `X-Expected-Version` header (checked
/// before storage is touched) or implicitly from the read below; the
/// store's conditional write settles any race either way.
async fn update_item(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<UpdateItemInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, GateError> {
    let Path(id) = id.map_err(|_| GateError::NotFound)?;

    let mut item = state.writes.get(id).await?;
    check_precondition(&headers, item.version)?;

    let Json(input) = payload.map_err(bad_request)?;
    if let Some(name) = &input.name {
        let mut checks = Checks::new();
        checks.check(!name.is_empty(), "name", "must be provided");
        checks.finish()?;
    }

    let fields = ItemFields {
        name: input.name,
        tags: input.tags,
    };
    let new_version = state.writes.commit(id, item.version, fields.clone()).await?;

    fields.apply_to(&mut item);
    item.version = new_version;
    Ok(Json(json!({ "item": item })))
}

fn bad_request(rejection: JsonRejection) -> GateError {
    GateError::BadRequest(rejection.body_text())
}
