//! API Key Authentication (Bearer Token)
//!
//! Resolves the bearer token against the `api_keys` table and attaches
//! the billing context to the request.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use tsumugi::ApiKeyRepository;

use crate::application::RequestContext;
use crate::AppState;

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let context = authenticate(state.api_keys.as_ref(), request.headers()).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(header) => match header.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(token.trim()),
            _ => {
                tracing::warn!("Invalid Authorization header format");
                Err(StatusCode::UNAUTHORIZED)
            }
        },
        None => {
            tracing::warn!("Missing Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Look up an active key for the request and build its billing context
pub async fn authenticate<R: ApiKeyRepository + ?Sized>(
    repo: &R,
    headers: &HeaderMap,
) -> Result<RequestContext, StatusCode> {
    let token = bearer_token(headers)?;

    let key = repo
        .find_active(token)
        .await
        .map_err(|e| {
            tracing::error!("API key lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or_else(|| {
            tracing::warn!("Invalid API key attempted");
            StatusCode::UNAUTHORIZED
        })?;

    if let Err(e) = repo.touch(&key.id).await {
        tracing::warn!("Failed to update last_used_at for key {}: {}", key.id, e);
    }

    Ok(RequestContext {
        api_key_id: Some(key.id),
        user_id: Some(key.user_id),
    })
}
