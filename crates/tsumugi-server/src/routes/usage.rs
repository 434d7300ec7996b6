//! Usage Routes - Metering records and totals
//!
//! `/usage/me*` covers every key of the calling user, `/usage*` only the
//! key that authenticated the request.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};

use tsumugi::UsageScope;

use crate::application::RequestContext;
use crate::models::{UsageQuery, UsageRecordResponse, UsageSummaryResponse};
use crate::AppState;

fn user_scope(context: &RequestContext) -> Result<UsageScope, (StatusCode, String)> {
    context
        .user_id
        .clone()
        .map(UsageScope::User)
        .ok_or((StatusCode::UNAUTHORIZED, "No user on request".to_string()))
}

fn key_scope(context: &RequestContext) -> Result<UsageScope, (StatusCode, String)> {
    context
        .api_key_id
        .clone()
        .map(UsageScope::ApiKey)
        .ok_or((StatusCode::UNAUTHORIZED, "No API key on request".to_string()))
}

async fn list_in_scope(
    state: &AppState,
    scope: UsageScope,
    query: UsageQuery,
) -> Result<Json<Vec<UsageRecordResponse>>, (StatusCode, String)> {
    let records = state
        .usage
        .list(&scope, query.into())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(records.into_iter().map(Into::into).collect()))
}

async fn summarize_scope(
    state: &AppState,
    scope: UsageScope,
    query: UsageQuery,
) -> Result<Json<UsageSummaryResponse>, (StatusCode, String)> {
    let summary = state
        .usage
        .summary(&scope, query.into())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(summary.into()))
}

/// Usage records of the calling user, newest first
#[utoipa::path(
    get,
    path = "/usage/me",
    params(UsageQuery),
    responses(
        (status = 200, description = "Usage records", body = Vec<UsageRecordResponse>),
        (status = 500, description = "Internal server error")
    ),
    tag = "Usage"
)]
pub async fn my_usage(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<UsageRecordResponse>>, (StatusCode, String)> {
    list_in_scope(&state, user_scope(&context)?, query).await
}

/// Usage totals of the calling user, per model
#[utoipa::path(
    get,
    path = "/usage/me/summary",
    params(UsageQuery),
    responses(
        (status = 200, description = "Usage summary", body = UsageSummaryResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "Usage"
)]
pub async fn my_usage_summary(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageSummaryResponse>, (StatusCode, String)> {
    summarize_scope(&state, user_scope(&context)?, query).await
}

/// Usage records of the calling API key, newest first
#[utoipa::path(
    get,
    path = "/usage",
    params(UsageQuery),
    responses(
        (status = 200, description = "Usage records", body = Vec<UsageRecordResponse>),
        (status = 500, description = "Internal server error")
    ),
    tag = "Usage"
)]
pub async fn key_usage(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<UsageRecordResponse>>, (StatusCode, String)> {
    list_in_scope(&state, key_scope(&context)?, query).await
}

/// Usage totals of the calling API key, per model
#[utoipa::path(
    get,
    path = "/usage/summary",
    params(UsageQuery),
    responses(
        (status = 200, description = "Usage summary", body = UsageSummaryResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "Usage"
)]
pub async fn key_usage_summary(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageSummaryResponse>, (StatusCode, String)> {
    summarize_scope(&state, key_scope(&context)?, query).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/usage", get(key_usage))
        .route("/usage/summary", get(key_usage_summary))
        .route("/usage/me", get(my_usage))
        .route("/usage/me/summary", get(my_usage_summary))
}
