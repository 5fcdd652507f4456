use crate::error::AuthError;
use crate::handlers::auth::verify_jwt_token;
use crate::models::auth::AuthUser;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

/// Resolves the bearer token to an active user and stores the caller's
/// identity in the request extensions as [`AuthUser`].
pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = headers.get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidToken)?;

    // Extract token from "Bearer <token>" format
    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let claims = verify_jwt_token(token, &state.config.jwt_secret).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        AuthError::InvalidToken
    })?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    let user = state
        .stores
        .users
        .find_user_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AuthError::Inactive)?;

    let caller = AuthUser {
        id: user.id,
        role: user.role(),
        is_active: user.is_active,
    };
    request.extensions_mut().insert(caller);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(caller);
    Ok(response)
}
