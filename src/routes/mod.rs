//! API routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::core::{ChatError, NO_INPUT_REPLY};
use crate::providers::CompletionError;
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "responseText")]
    pub response_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
}

impl ChatResponse {
    fn text(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            persisted: None,
        }
    }
}

/// History replacement accepts either a bare array or `{"conversation": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HistoryUpdate {
    Bare(Conversation),
    Wrapped { conversation: Conversation },
}

impl HistoryUpdate {
    fn into_conversation(self) -> Conversation {
        match self {
            Self::Bare(c) | Self::Wrapped { conversation: c } => c,
        }
    }
}

#[derive(Debug, Serialize)]
struct SavedResponse {
    status: &'static str,
    turns: usize,
}

/// Errors rendered as `{"responseText": ...}` so clients always get a message to show
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Chat(ChatError),
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self::Chat(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request: {}", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, text) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Chat(ChatError::EmptyInput) => {
                (StatusCode::BAD_REQUEST, NO_INPUT_REPLY.to_string())
            }
            Self::Chat(ChatError::InvalidHistory(e)) => (
                StatusCode::BAD_REQUEST,
                format!("Error saving conversation: {}", e),
            ),
            Self::Chat(ChatError::Storage(e)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error saving conversation: {}", e),
            ),
            Self::Chat(ChatError::Completion(e)) => {
                let status = match e {
                    CompletionError::RetriesExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    CompletionError::Inference(_) => StatusCode::BAD_GATEWAY,
                };
                tracing::error!(error = %e, kind = ?e.kind(), "Completion failed");
                (status, format!("An error occurred: {}", e))
            }
        };

        (status, Json(ChatResponse::text(text))).into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = request?;
    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| state.config.default_conversation.clone());

    let exchange = state
        .chat_engine
        .exchange(&conversation_id, &request.input)
        .await?;

    Ok(Json(ChatResponse {
        response_text: exchange.reply,
        persisted: Some(exchange.persisted),
    }))
}

async fn ask(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = request?;
    let reply = state.chat_engine.ask(&request.input).await?;
    Ok(Json(ChatResponse::text(reply)))
}

async fn default_history(State(state): State<AppState>) -> Json<Conversation> {
    Json(
        state
            .chat_engine
            .history(&state.config.default_conversation)
            .await,
    )
}

async fn history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<Conversation> {
    Json(state.chat_engine.history(&conversation_id).await)
}

async fn save_default_history(
    State(state): State<AppState>,
    update: Result<Json<HistoryUpdate>, JsonRejection>,
) -> Result<Json<SavedResponse>, ApiError> {
    let conversation_id = state.config.default_conversation.clone();
    replace(&state, &conversation_id, update).await
}

async fn save_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    update: Result<Json<HistoryUpdate>, JsonRejection>,
) -> Result<Json<SavedResponse>, ApiError> {
    replace(&state, &conversation_id, update).await
}

async fn replace(
    state: &AppState,
    conversation_id: &str,
    update: Result<Json<HistoryUpdate>, JsonRejection>,
) -> Result<Json<SavedResponse>, ApiError> {
    let Json(update) = update?;
    let conversation = update.into_conversation();

    state
        .chat_engine
        .replace_history(conversation_id, &conversation)
        .await?;

    Ok(Json(SavedResponse {
        status: "Conversation history updated successfully!",
        turns: conversation.len(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/", post(chat))
        .route("/chat", post(chat))
        .route("/v1/ask", post(ask))
        .route("/history", get(default_history))
        .route("/history/save", post(save_default_history))
        .route("/history/:conversation_id", get(history).put(save_history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::core::memory_testing::MemoryDocuments;
    use crate::core::testing::engine;
    use crate::providers::testing::ScriptedBackend;
    use crate::providers::InferenceError;

    fn app(backend: Arc<ScriptedBackend>, docs: Arc<MemoryDocuments>) -> Router {
        let state = AppState {
            config: Config::default(),
            chat_engine: Arc::new(engine(backend, docs)),
        };
        router().with_state(state)
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let docs = Arc::new(MemoryDocuments::default());
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("How long have you felt this way?".into())]));
        let app = app(backend, docs.clone());

        let (status, body) = call(
            app.clone(),
            Method::POST,
            "/",
            Some(json!({"input": "I can't focus"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["responseText"], "How long have you felt this way?");
        assert_eq!(body["persisted"], true);

        let (status, history) = call(app, Method::GET, "/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            history,
            json!([
                {"role": "user", "content": "I can't focus"},
                {"role": "assistant", "content": "How long have you felt this way?"}
            ])
        );
    }

    #[tokio::test]
    async fn test_empty_input_sentinel() {
        let backend = Arc::new(ScriptedBackend::default());
        let app = app(backend.clone(), Arc::new(MemoryDocuments::default()));

        let (status, body) = call(app.clone(), Method::POST, "/chat", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["responseText"], "No input received.");

        let (_, body) = call(app, Method::POST, "/v1/ask", Some(json!({"input": ""}))).await;
        assert_eq!(body["responseText"], "No input received.");
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_permanent_error_message() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(InferenceError::permanent(
            "AccessDeniedException: not allowed",
        ))]));
        let app = app(backend, Arc::new(MemoryDocuments::default()));

        let (status, body) = call(app, Method::POST, "/", Some(json!({"input": "hi"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            body["responseText"],
            "An error occurred: AccessDeniedException: not allowed"
        );
    }

    #[tokio::test]
    async fn test_save_failure_flagged() {
        let docs = Arc::new(MemoryDocuments {
            fail_writes: true,
            ..Default::default()
        });
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("Noted.".into())]));
        let app = app(backend, docs);

        let (status, body) = call(app, Method::POST, "/", Some(json!({"input": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["persisted"], false);
        assert_eq!(
            body["responseText"],
            "Noted. Would you like to talk more about that?"
        );
    }

    #[tokio::test]
    async fn test_history_edit_by_id() {
        let docs = Arc::new(MemoryDocuments::default());
        let app = app(Arc::new(ScriptedBackend::default()), docs);

        let edited = json!([{"role": "user", "content": "edited"}]);
        let (status, _) = call(
            app.clone(),
            Method::PUT,
            "/history/sam",
            Some(json!({"conversation": edited})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, history) = call(app.clone(), Method::GET, "/history/sam", None).await;
        assert_eq!(history, edited);

        let (status, _) = call(
            app,
            Method::POST,
            "/history/save",
            Some(json!([{"role": "wizard", "content": "x"}])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
