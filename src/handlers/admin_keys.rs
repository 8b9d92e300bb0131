//! Admin key management endpoints.
//!
//! All routes here sit behind the admin gate. The mutation endpoints
//! (create, toggle, delete) carry additional abuse guards: every
//! mutation is flood-checked against its request signature, and the
//! per-key mutations also run the targeted key id through the replay
//! ledger so a captured toggle/delete cannot be blindly resubmitted.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::AppError,
    handlers::{client_ip, header_str},
    models::{api_key::CreateKeyRequest, audit_log::AuditAction},
    security::anti_replay::SecurityLedger,
    services::auth_service,
    AppState,
};

struct RequestMeta {
    ip: String,
    user_agent: String,
    fingerprint: String,
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip = client_ip(headers);
    let user_agent = header_str(headers, "user-agent").unwrap_or_else(|| "unknown".to_string());
    let fingerprint = SecurityLedger::fingerprint(
        Some(&ip),
        Some(&user_agent),
        header_str(headers, "accept").as_deref(),
        header_str(headers, "accept-encoding").as_deref(),
        header_str(headers, "accept-language").as_deref(),
    );

    RequestMeta {
        ip,
        user_agent,
        fingerprint,
    }
}

/// Flood guard shared by every mutation endpoint.
async fn guard_flood(
    state: &AppState,
    meta: &RequestMeta,
    method: &str,
    path: &str,
) -> Result<(), AppError> {
    let signature = SecurityLedger::request_signature(method, path, &meta.ip, &meta.fingerprint);
    let flood = state.ledger.check_flood(&signature, &meta.ip);

    if flood.is_flooding {
        auth_service::audit(
            &state.pool,
            &state.config.admin_key,
            &state.config.admin_key,
            AuditAction::FloodAttackDetected,
            None,
            Some(&meta.ip),
            Some(&meta.user_agent),
            false,
            json!({ "endpoint": path, "count": flood.count }),
        )
        .await;
        return Err(AppError::FloodDetected(flood.count));
    }

    Ok(())
}

/// Replay guard for the per-key mutations, keyed on the target id.
async fn guard_replay(
    state: &AppState,
    meta: &RequestMeta,
    path: &str,
    key_id: Uuid,
) -> Result<(), AppError> {
    let replay = state
        .ledger
        .check_replay(&key_id.to_string(), &meta.ip, &meta.fingerprint);

    if replay.is_replay {
        auth_service::audit(
            &state.pool,
            &state.config.admin_key,
            &state.config.admin_key,
            AuditAction::ReplayAttackDetected,
            None,
            Some(&meta.ip),
            Some(&meta.user_agent),
            false,
            json!({ "endpoint": path, "motivo": replay.reason }),
        )
        .await;
        return Err(AppError::ReplayDetected(replay.reason.to_string()));
    }

    Ok(())
}

/// `POST /api/admin/keys` — mint a new key. The raw token appears in
/// this response and nowhere else.
pub async fn create_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateKeyRequest>,
) -> Result<Json<Value>, AppError> {
    let meta = request_meta(&headers);
    guard_flood(&state, &meta, "POST", "/api/admin/keys").await?;

    let token = auth_service::create_api_key(
        &state.pool,
        &state.config.admin_key,
        &request.nome,
        &request.tipo,
        request.rate_limit,
        request.daily_limit,
        "admin",
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "key": token,
        "nome": request.nome,
        "message": "API key criada com sucesso. Guarde-a: ela não será exibida novamente.",
    })))
}

/// `GET /api/admin/keys` — masked listing plus ledger introspection.
pub async fn list_keys(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let keys = auth_service::list_api_keys(&state.pool, &state.config.admin_key).await?;
    let security = state.ledger.stats();

    Ok(Json(json!({
        "success": true,
        "total": keys.len(),
        "keys": keys,
        "security": security,
    })))
}

/// `PATCH /api/admin/keys/{id}` — flip a key's active flag.
pub async fn toggle_key(
    State(state): State<AppState>,
    Path(key_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let meta = request_meta(&headers);
    let path = format!("/api/admin/keys/{key_id}");
    guard_replay(&state, &meta, &path, key_id).await?;
    guard_flood(&state, &meta, "PATCH", &path).await?;

    let ativo = auth_service::toggle_api_key(&state.pool, &state.config.admin_key, key_id).await?;

    Ok(Json(json!({
        "success": true,
        "ativo": ativo,
        "message": if ativo { "API key ativada" } else { "API key desativada" },
    })))
}

/// `DELETE /api/admin/keys/{id}` — remove a key. The admin credential
/// itself can never be deleted.
pub async fn delete_key(
    State(state): State<AppState>,
    Path(key_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let meta = request_meta(&headers);
    let path = format!("/api/admin/keys/{key_id}");
    guard_replay(&state, &meta, &path, key_id).await?;
    guard_flood(&state, &meta, "DELETE", &path).await?;

    auth_service::delete_api_key(&state.pool, &state.config.admin_key, key_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "API key removida",
    })))
}
