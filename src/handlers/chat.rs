// src/handlers/chat.rs
use crate::error::ChatError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::auth_middleware;
use crate::models::auth::AuthUser;
use crate::models::chat::{
    ConversationAnalytics, EndedSession, MessageView, MessagesQuery, RenameSessionRequest,
    SendMessageRequest, SentMessages, SessionInfo, SessionSummary, SessionTitle,
    StartSessionRequest, UpdateReadRequest,
};
use crate::models::response::ApiResponse;
use crate::services::chat_service::SendMessage;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ChatError>;

fn ok<T: serde::Serialize>(status: StatusCode, message: &str, data: T) -> ApiResult<T> {
    Ok((status, Json(ApiResponse::ok(message, data))))
}

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/messages/session", post(start_session))
        .route("/api/messages/send-message/:session_id", post(send_message))
        .route("/api/messages/get-message/:session_id", get(get_messages))
        .route("/api/messages/chat-session-info/:session_id", get(session_info))
        .route("/api/messages/analytics/:session_id", get(session_analytics))
        .route("/api/messages/rename-session/:session_id", patch(rename_session))
        .route("/api/messages/delete-session/:session_id", delete(delete_session))
        .route("/api/messages/:session_id/end", put(end_session))
        .route("/api/messages/:session_id/:message_id", delete(delete_message))
        .route("/api/messages/:session_id/:message_id/read", patch(update_message_read))
        .route("/api/list/chat-sessions", get(list_sessions))
        .route("/api/list/chat-session-info/:session_id", get(session_info))
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// The session-start body is optional; an empty body means "use defaults".
fn optional_body<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> Result<T, ChatError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|_| {
        ChatError::Validation("Title must be a string with max length of 100 characters".to_string())
    })
}

fn parse_page_param(raw: Option<String>) -> Result<Option<i64>, ChatError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<i64>()
            .map_err(|_| ChatError::Validation("Invalid pagination parameters".to_string()))
    })
    .transpose()
}

async fn start_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> ApiResult<SessionTitle> {
    let payload: StartSessionRequest = optional_body(&body)?;
    let created = state.chat.start_session(user.id, payload.title).await?;
    ok(StatusCode::CREATED, "Chat session started successfully", created)
}

async fn send_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath(session_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SendMessageRequest>,
) -> ApiResult<SentMessages> {
    let defaults = SendMessage::default();
    let request = SendMessage {
        content: payload.content.unwrap_or_default(),
        message_type: payload.message_type.unwrap_or(defaults.message_type),
        metadata: payload.metadata.unwrap_or(defaults.metadata),
        file_name: payload.file_name,
        return_both: payload.message_return.unwrap_or(defaults.return_both),
    };
    let sent = state.chat.send_message(user.id, session_id, request).await?;
    ok(StatusCode::CREATED, "Message sent successfully", sent)
}

async fn get_messages(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath(session_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<MessagesQuery>,
) -> ApiResult<Vec<MessageView>> {
    let page = parse_page_param(query.page)?;
    let limit = parse_page_param(query.limit)?;
    let messages = state
        .chat
        .get_messages(user.id, session_id, page, limit)
        .await?;
    ok(StatusCode::OK, "Messages retrieved successfully", messages)
}

async fn session_info(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<SessionInfo> {
    let info = state.chat.session_info(user.id, session_id).await?;
    ok(StatusCode::OK, "Chat session retrieved successfully", info)
}

async fn session_analytics(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<ConversationAnalytics> {
    let analytics = state.chat.session_analytics(user.id, session_id).await?;
    ok(StatusCode::OK, "Conversation analytics retrieved successfully", analytics)
}

async fn list_sessions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<SessionSummary>> {
    let sessions = state.chat.list_sessions(user.id).await?;
    ok(StatusCode::OK, "Chat sessions retrieved successfully", sessions)
}

async fn end_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<EndedSession> {
    let session = state.chat.end_session(user.id, session_id).await?;
    ok(
        StatusCode::OK,
        "Chat session ended successfully",
        EndedSession { session },
    )
}

async fn rename_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath(session_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<SessionTitle> {
    // A non-string title is a validation failure, not a malformed body.
    let payload: RenameSessionRequest = serde_json::from_value(payload).unwrap_or_default();
    let renamed = state
        .chat
        .rename_session(user.id, session_id, payload.title)
        .await?;
    ok(StatusCode::OK, "Chat session renamed successfully", renamed)
}

async fn delete_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.chat.delete_session(user.id, session_id).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok_empty("Chat session deleted successfully")),
    ))
}

async fn delete_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath((session_id, message_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<()> {
    state
        .chat
        .delete_message(user.id, session_id, message_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok_empty("Message deleted successfully")),
    ))
}

async fn update_message_read(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiPath((session_id, message_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<UpdateReadRequest>,
) -> ApiResult<MessageView> {
    let view = state
        .chat
        .set_message_read(user.id, session_id, message_id, payload.is_read)
        .await?;
    ok(StatusCode::OK, "Message updated successfully", view)
}

#[cfg(test)]
mod tests {
    use crate::handlers::app_router;
    use crate::handlers::auth::generate_jwt_token;
    use crate::test_support::{seed_user, test_state};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Client {
        app: Router,
        token: String,
    }

    impl Client {
        async fn new() -> Self {
            let (state, store, _ai) = test_state();
            let user = seed_user(&store, "dana@example.com", "password1").await;
            let token = generate_jwt_token(&user, &state.config).unwrap();
            Client {
                app: app_router(state),
                token,
            }
        }

        async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder()
                .method(method)
                .uri(uri)
                .header("authorization", format!("Bearer {}", self.token));
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn start(&self) -> String {
            let (status, body) = self
                .call(Method::POST, "/api/messages/session", None)
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["data"]["sessionId"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_requests_without_token_are_rejected() {
        let (state, _store, _ai) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::post("/api/messages/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_full_conversation_flow() {
        let client = Client::new().await;
        let session_id = client.start().await;

        let (status, body) = client
            .call(
                Method::POST,
                &format!("/api/messages/send-message/{}", session_id),
                Some(json!({ "content": "Hello" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["userMessage"]["content"], "Hello");
        assert_eq!(body["data"]["botMessage"]["content"], "Hi there");

        let (status, body) = client
            .call(
                Method::GET,
                &format!("/api/list/chat-session-info/{}", session_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Hello");

        let (status, body) = client
            .call(
                Method::GET,
                &format!("/api/messages/get-message/{}?page=1&limit=50", session_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let messages = body["data"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["isFromBot"], false);
        assert_eq!(messages[1]["isFromBot"], true);
        assert_eq!(messages[1]["type"], "TEXT");

        let (status, body) = client
            .call(
                Method::GET,
                &format!("/api/messages/analytics/{}", session_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["messageCount"], 2);

        let (status, _) = client
            .call(Method::PUT, &format!("/api/messages/{}/end", session_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = client
            .call(Method::PUT, &format!("/api/messages/{}/end", session_id), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["data"], Value::Null);

        let (status, _) = client
            .call(
                Method::DELETE,
                &format!("/api/messages/delete-session/{}", session_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = client
            .call(Method::GET, "/api/list/chat-sessions", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_rate_limited_send_returns_429() {
        let client = Client::new().await;
        let session_id = client.start().await;
        let uri = format!("/api/messages/send-message/{}", session_id);

        for _ in 0..10 {
            let (status, _) = client
                .call(Method::POST, &uri, Some(json!({ "content": "ping" })))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = client
            .call(Method::POST, &uri, Some(json!({ "content": "ping" })))
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_validation_errors_use_envelope() {
        let client = Client::new().await;
        let session_id = client.start().await;

        let (status, body) = client
            .call(
                Method::POST,
                "/api/messages/session",
                Some(json!({ "title": 42 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = client
            .call(
                Method::GET,
                &format!("/api/messages/get-message/{}?page=abc", session_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = client
            .call(
                Method::PATCH,
                &format!("/api/messages/rename-session/{}", session_id),
                Some(json!({ "title": 7 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = client
            .call(
                Method::POST,
                &format!("/api/messages/send-message/{}", session_id),
                Some(json!({ "content": "hi", "type": "GIF" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let client = Client::new().await;
        let missing = uuid::Uuid::new_v4();

        let (status, _) = client
            .call(
                Method::GET,
                &format!("/api/messages/chat-session-info/{}", missing),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = client
            .call(
                Method::DELETE,
                &format!("/api/messages/{}/{}", missing, uuid::Uuid::new_v4()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bot_only_response_and_read_update() {
        let client = Client::new().await;
        let session_id = client.start().await;

        let (status, body) = client
            .call(
                Method::POST,
                &format!("/api/messages/send-message/{}", session_id),
                Some(json!({ "content": "Hello", "messageReturn": false })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"].get("userMessage").is_none());
        let bot_id = body["data"]["botMessage"]["id"].as_str().unwrap().to_string();

        let (status, body) = client
            .call(
                Method::PATCH,
                &format!("/api/messages/{}/{}/read", session_id, bot_id),
                Some(json!({ "isRead": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isRead"], true);
    }
}
