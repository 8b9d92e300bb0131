//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and a stable `code`
/// string in the response body. Callers branch on `code`, not on the
/// human-readable message.
///
/// # Error Categories
///
/// - **Authentication**: missing, unknown, deactivated or expired credentials
/// - **Authorization**: non-admin callers hitting admin endpoints
/// - **Quota**: hourly/daily limits exceeded (carries remaining counters)
/// - **Validation**: malformed tipo/cpf/nome/numero or detected injection
/// - **Abuse**: replay and flood detections on mutation endpoints
/// - **Database**: any sqlx::Error (details hidden from the client)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No credential in the `x-api-key` header, `apiKey` query parameter
    /// or `apiKey` cookie. Returns HTTP 401.
    #[error("API-KEY não fornecida")]
    MissingApiKey,

    /// Credential is unknown, deactivated or expired. The string carries
    /// the registry's reason. Returns HTTP 401.
    #[error("{0}")]
    InvalidApiKey(String),

    /// Hourly or daily quota exhausted. Returns HTTP 429 with the
    /// remaining counters so the caller can back off sensibly.
    #[error("{message}")]
    RateLimitExceeded {
        message: String,
        remaining_hour: i64,
        remaining_day: i64,
    },

    /// The `tipo` discriminator is not one of cpf/nome/numero.
    /// Returns HTTP 400.
    #[error("{0}")]
    InvalidType(String),

    /// Per-type input shape validation failed (or an injection pattern was
    /// detected in the input). Returns HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// Structurally identical requests arriving too fast from one client.
    /// Returns HTTP 429.
    #[error("Too many requests ({0}). Please slow down.")]
    FloodDetected(u64),

    /// A nonce was reused within its validity window by the same client.
    /// Returns HTTP 429.
    #[error("Ataque de replay detectado: {0}")]
    ReplayDetected(String),

    /// Admin endpoint called without the administrator credential.
    /// Returns HTTP 403.
    #[error("Chave de administrador inválida")]
    AdminOnly,

    /// Referenced API key does not exist. Returns HTTP 404.
    #[error("API-KEY não encontrada")]
    KeyNotFound,

    /// Attempt to delete the administrator credential. Returns HTTP 403.
    #[error("Não é possível deletar a chave de administrador")]
    AdminKeyProtected,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("{0}")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return a flat JSON body:
/// ```json
/// {
///   "success": false,
///   "error": "Human-readable message",
///   "code": "STABLE_CODE"
/// }
/// ```
///
/// Quota errors additionally carry `remainingHour` / `remainingDay`, and
/// flood detections carry `floodDetected: true`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, code string)
        let (status, code) = match self {
            AppError::MissingApiKey => (StatusCode::UNAUTHORIZED, "MISSING_API_KEY"),
            AppError::InvalidApiKey(_) => (StatusCode::UNAUTHORIZED, "INVALID_API_KEY"),
            AppError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
            AppError::InvalidType(_) => (StatusCode::BAD_REQUEST, "INVALID_TYPE"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::FloodDetected(_) => (StatusCode::TOO_MANY_REQUESTS, "FLOOD_DETECTED"),
            AppError::ReplayDetected(_) => (StatusCode::TOO_MANY_REQUESTS, "REPLAY_DETECTED"),
            AppError::AdminOnly => (StatusCode::FORBIDDEN, "ADMIN_ONLY"),
            AppError::KeyNotFound => (StatusCode::NOT_FOUND, "KEY_NOT_FOUND"),
            AppError::AdminKeyProtected => (StatusCode::FORBIDDEN, "ADMIN_KEY_PROTECTED"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        // Internal faults never leak details to the client
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {e}");
                "Erro interno".to_string()
            }
            other => other.to_string(),
        };

        // Build JSON response body
        let mut body = json!({
            "success": false,
            "error": message,
            "code": code,
        });

        match self {
            AppError::RateLimitExceeded {
                remaining_hour,
                remaining_day,
                ..
            } => {
                body["remainingHour"] = json!(remaining_hour);
                body["remainingDay"] = json!(remaining_day);
            }
            AppError::FloodDetected(_) => {
                body["floodDetected"] = json!(true);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
