//! Credential validation endpoint used by the dashboard login.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppError,
    handlers::header_str,
    models::api_key::{ApiKey, Credential},
    services::auth_service,
    AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub api_key: Option<String>,
}

fn valid_body(credential: Credential) -> Value {
    let user_data = match credential {
        Credential::Admin => json!({
            "nome": "Administrador",
            "tier": "admin",
            "unlimited": true,
        }),
        Credential::Registered(key) => json!({
            "key": ApiKey::mask_token(&key.key),
            "nome": key.nome,
            "tier": key.tier,
            "rateLimit": key.rate_limit,
            "dailyLimit": key.daily_limit,
            "usedThisHour": key.used_this_hour,
            "usedToday": key.used_today,
            "expiresAt": key.expires_at,
        }),
    };

    json!({
        "success": true,
        "valid": true,
        "userData": user_data,
    })
}

fn invalid_body(reason: &str) -> Value {
    json!({
        "success": false,
        "valid": false,
        "error": reason,
    })
}

/// `POST /api/auth/validate` — check a credential and return its masked
/// profile. A rejected key is a normal answer for the login form, not an
/// HTTP failure: it comes back 200 with `valid: false`. The raw token is
/// never echoed back.
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<Value>, AppError> {
    let token = header_str(&headers, "x-api-key")
        .or(request.api_key)
        .ok_or(AppError::MissingApiKey)?;

    match auth_service::validate_api_key(&state.pool, &state.config.admin_key, &token).await {
        Ok(credential) => Ok(Json(valid_body(credential))),
        Err(AppError::InvalidApiKey(reason)) => Ok(Json(invalid_body(&reason))),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_keys_answer_valid_false_not_an_error() {
        let body = invalid_body("API-KEY inválida");
        assert_eq!(body["valid"], false);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "API-KEY inválida");
    }

    #[test]
    fn admin_profile_is_synthetic_and_unlimited() {
        let body = valid_body(Credential::Admin);
        assert_eq!(body["valid"], true);
        assert_eq!(body["userData"]["tier"], "admin");
        assert_eq!(body["userData"]["unlimited"], true);
    }
}
