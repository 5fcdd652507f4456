use crate::config::AppConfig;
use crate::error::AuthError;
use crate::extract::AuthJson;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::*;
use crate::models::response::ApiResponse;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

pub fn auth_routes() -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login));

    let protected_routes = Router::new()
        .route("/api/auth/verify", get(verify_token))
        .layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    AuthJson(payload): AuthJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthPayload>>), AuthError> {
    let email = payload.email.trim().to_lowercase();
    let username = payload.username.trim().to_string();

    if email.is_empty() || username.is_empty() || payload.password.is_empty() {
        return Err(AuthError::Validation(
            "Email, username, and password are required".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(AuthError::Validation("Invalid email address".to_string()));
    }
    if payload.password.len() < 6 {
        return Err(AuthError::Validation(
            "Password must be at least 6 characters long".to_string(),
        ));
    }

    let password_hash = hash(&payload.password, state.config.bcrypt_cost).map_err(|e| {
        tracing::error!("Error hashing password: {}", e);
        AuthError::Internal(e.to_string())
    })?;

    let user = state
        .stores
        .users
        .create_user(NewUser {
            email,
            username,
            password_hash,
            role: Role::User,
        })
        .await?;
    tracing::info!(user_id = %user.id, "user registered");

    let token = generate_jwt_token(&user, &state.config)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "User registered successfully",
            AuthPayload {
                user: UserResponse::from(user),
                token,
            },
        )),
    ))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    AuthJson(payload): AuthJson<LoginRequest>,
) -> Result<Json<ApiResponse<AuthPayload>>, AuthError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AuthError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let user = state
        .stores
        .users
        .find_user_by_email(&payload.email.trim().to_lowercase())
        .await?
        .filter(|u| u.is_active)
        .ok_or(AuthError::InvalidCredentials)?;

    let valid = verify(&payload.password, &user.password_hash).map_err(|e| {
        tracing::error!("Error verifying password: {}", e);
        AuthError::Internal(e.to_string())
    })?;
    if !valid {
        return Err(AuthError::InvalidCredentials);
    }

    let token = generate_jwt_token(&user, &state.config)?;
    Ok(Json(ApiResponse::ok(
        "Login successful",
        AuthPayload {
            user: UserResponse::from(user),
            token,
        },
    )))
}

async fn verify_token(
    Extension(state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<ApiResponse<UserResponse>>, AuthError> {
    let user = state
        .stores
        .users
        .find_user_by_id(caller.id)
        .await?
        .ok_or(AuthError::Inactive)?;
    Ok(Json(ApiResponse::ok("Token is valid", UserResponse::from(user))))
}

pub fn generate_jwt_token(user: &User, config: &AppConfig) -> Result<String, AuthError> {
    let now = Utc::now();
    let expiration = now + Duration::hours(config.jwt_expiry_hours);

    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role(),
        exp: expiration.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Error generating JWT token: {}", e);
        AuthError::Internal(e.to_string())
    })
}

pub fn verify_jwt_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::app_router;
    use crate::test_support::{seed_user, test_config, test_state};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn sample_user() -> User {
        User {
            id: uuid::Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            password_hash: String::new(),
            role: "ADMIN".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_jwt_round_trip() {
        let config = test_config();
        let user = sample_user();
        let token = generate_jwt_token(&user, &config).unwrap();
        let claims = verify_jwt_token(&token, &config.jwt_secret).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_jwt_rejects_wrong_secret() {
        let config = test_config();
        let token = generate_jwt_token(&sample_user(), &config).unwrap();
        assert!(verify_jwt_token(&token, "another-secret").is_err());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (state, _store, _ai) = test_state();
        let app = app_router(state);

        let response = app
            .clone()
            .oneshot(json_post(
                "/api/auth/register",
                serde_json::json!({ "email": "Bob@Example.com", "username": "bob", "password": "hunter22" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["user"]["email"], "bob@example.com");

        let response = app
            .clone()
            .oneshot(json_post(
                "/api/auth/register",
                serde_json::json!({ "email": "bob@example.com", "username": "bob2", "password": "hunter22" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(json_post(
                "/api/auth/login",
                serde_json::json!({ "email": "bob@example.com", "password": "wrong-pass" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(json_post(
                "/api/auth/login",
                serde_json::json!({ "email": "bob@example.com", "password": "hunter22" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["data"]["token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (state, _store, _ai) = test_state();
        let response = app_router(state)
            .oneshot(json_post(
                "/api/auth/register",
                serde_json::json!({ "email": "a@b.c", "username": "a", "password": "123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_verify_requires_token() {
        let (state, store, _ai) = test_state();
        let user = seed_user(&store, "carol@example.com", "secret1").await;
        let token = generate_jwt_token(&user, &state.config).unwrap();
        let app = app_router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/api/auth/verify").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/api/auth/verify")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["username"], "carol");
    }
}
