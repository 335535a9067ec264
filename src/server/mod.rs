//! HTTP surface for the chat backend.
//!
//! Thin glue between the wire formats the front end speaks and
//! [`ChatSession`]: handlers decode input, hand a `Turn` to the session,
//! and map the receipt back to the `success`/`response`/`error` shapes the
//! client expects. All orchestration policy lives in the session layer.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::error;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::session::{ChatSession, Role, Turn, TurnReceipt};

/// Image formats the analysis script accepts, by file extension.
const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "dcm", "dicom", "tiff", "bmp"];

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// JSON body of `POST /api/analyze-image`: a base64 data URL.
#[derive(Debug, Deserialize)]
pub struct AnalyzeImageRequest {
    pub image: String,
}

#[derive(Debug, Serialize)]
struct TurnSuccessResponse {
    success: bool,
    response: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ApiErrorResponse {
    success: bool,
    error: String,
}

#[derive(Debug, Serialize)]
struct ConversationResponse {
    success: bool,
    messages: Vec<ConversationEntry>,
}

#[derive(Debug, Serialize)]
struct ConversationEntry {
    id: u64,
    message: String,
    #[serde(rename = "isUser")]
    is_user: bool,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ClearConversationResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

/// Builds the application router. CORS is wide open, as in the original
/// deployment (the UI is served from a different origin in development).
pub fn router(session: Arc<ChatSession>) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/image", post(post_image))
        .route("/api/analyze-image", post(post_analyze_image))
        .route("/api/conversation", get(get_conversation))
        .route("/api/clear-conversation", post(post_clear_conversation))
        .layer(CorsLayer::permissive())
        .with_state(session)
}

// ============================================================================
// Handlers
// ============================================================================

async fn post_chat(
    State(session): State<Arc<ChatSession>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    submit(&session, Turn::Text(request.message)).await
}

/// Multipart upload variant: field `image` carries the file.
async fn post_image(
    State(session): State<Arc<ChatSession>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.png").to_string();
        match field.bytes().await {
            Ok(bytes) => {
                upload = Some((file_name, bytes.to_vec()));
                break;
            }
            Err(err) => {
                error!("failed to read multipart upload: {err}");
                return bad_request("Failed to read uploaded image");
            }
        }
    }

    let Some((file_name, bytes)) = upload else {
        return bad_request("No image file provided");
    };
    if !has_supported_extension(&file_name) {
        return bad_request(
            "Unsupported image format. Please upload JPG, PNG, DICOM, or TIFF files.",
        );
    }

    submit(&session, Turn::Image { bytes, file_name }).await
}

/// JSON upload variant: `image` is a `data:image/...;base64,...` URL.
async fn post_analyze_image(
    State(session): State<Arc<ChatSession>>,
    Json(request): Json<AnalyzeImageRequest>,
) -> Response {
    let Some(bytes) = decode_data_url(&request.image) else {
        return bad_request("Invalid or missing image data");
    };
    submit(
        &session,
        Turn::Image {
            bytes,
            file_name: String::from("upload.png"),
        },
    )
    .await
}

/// Always answers `success: true`; a session that cannot produce history
/// simply reports an empty list. The synthetic greeting is not included.
async fn get_conversation(State(session): State<Arc<ChatSession>>) -> Response {
    let messages = session
        .messages()
        .into_iter()
        .map(|message| ConversationEntry {
            id: message.id,
            message: message.content,
            is_user: message.role == Role::User,
            timestamp: message.created_at.to_rfc3339(),
        })
        .collect();

    Json(ConversationResponse {
        success: true,
        messages,
    })
    .into_response()
}

async fn post_clear_conversation(State(session): State<Arc<ChatSession>>) -> Response {
    match session.reset().await {
        Ok(()) => Json(ClearConversationResponse {
            success: true,
            error: None,
        })
        .into_response(),
        Err(err) => {
            error!("failed to clear conversation: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ClearConversationResponse {
                    success: false,
                    error: Some(String::from("Failed to clear conversation")),
                }),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn submit(session: &ChatSession, turn: Turn) -> Response {
    match session.submit_turn(turn).await {
        Ok(receipt) => turn_response(receipt),
        Err(rejection) => bad_request(&rejection.to_string()),
    }
}

fn turn_response(receipt: TurnReceipt) -> Response {
    match receipt.failure {
        None => Json(TurnSuccessResponse {
            success: true,
            response: receipt.assistant.content,
            timestamp: receipt.assistant.created_at.to_rfc3339(),
        })
        .into_response(),
        Some(kind) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiErrorResponse {
                success: false,
                error: String::from(kind.public_error_text()),
            }),
        )
            .into_response(),
    }
}

fn bad_request(error: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse {
            success: false,
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn has_supported_extension(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .is_some_and(|extension| SUPPORTED_IMAGE_EXTENSIONS.contains(&extension.as_str()))
}

/// Splits a `data:image/...;base64,payload` URL and decodes the payload.
/// Returns `None` for anything that is not an image data URL.
fn decode_data_url(data: &str) -> Option<Vec<u8>> {
    let (header, payload) = data.split_once(',')?;
    if !header.starts_with("data:image/") {
        return None;
    }
    BASE64.decode(payload.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_supported_extension("scan.PNG"));
        assert!(has_supported_extension("a.b.dcm"));
        assert!(!has_supported_extension("notes.txt"));
        assert!(!has_supported_extension("no_extension"));
    }

    #[test]
    fn data_url_decoding_requires_an_image_header() {
        assert_eq!(
            decode_data_url("data:image/png;base64,aGVsbG8="),
            Some(b"hello".to_vec())
        );
        assert!(decode_data_url("data:text/plain;base64,aGVsbG8=").is_none());
        assert!(decode_data_url("no comma here").is_none());
        assert!(decode_data_url("data:image/png;base64,@@@").is_none());
    }
}
