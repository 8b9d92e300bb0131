//! Key registry and audit log service.
//!
//! This service handles:
//! - Credential validation (admin sentinel and registry rows)
//! - Quota accounting with lazy window resets
//! - Key lifecycle (create, toggle, delete, list)
//! - Append-only audit logging with masking
//!
//! # Atomicity Guarantees
//!
//! The quota check and increment happen in a single conditional UPDATE:
//! the row only changes when both counters are still under their limits,
//! so two concurrent requests against a key at its last unit of quota can
//! never both pass.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::api_key::{ADMIN_KEY_SENTINEL, ApiKey, ApiKeyResponse, Credential, KeyTier};
use crate::models::audit_log::AuditAction;
use crate::security::anti_replay::SecurityLedger;
use crate::security::anti_sql::{mask_sensitive, sanitize_for_logging};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of generated key tokens.
const TOKEN_LENGTH: usize = 32;

/// Compare a presented token against the configured admin credential.
///
/// Both sides are hashed with SHA-256 and the fixed-length digests are
/// compared, so the comparison never short-circuits on the raw token
/// content.
pub fn is_admin_token(presented: &str, admin_key: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(admin_key.as_bytes())
}

/// Mask a token for logs and audit entries: the admin sentinel for the
/// admin credential, first-4/last-4 otherwise.
pub fn mask_key(token: &str, admin_key: &str) -> String {
    if is_admin_token(token, admin_key) {
        ADMIN_KEY_SENTINEL.to_string()
    } else {
        ApiKey::mask_token(token)
    }
}

/// Result of a quota check. `None` remaining counters mean unlimited
/// (the admin credential bypasses quota entirely).
#[derive(Debug, Clone)]
pub struct RateCheck {
    pub remaining_hour: Option<i64>,
    pub remaining_day: Option<i64>,
}

/// Validate a presented credential.
///
/// The admin credential resolves to `Credential::Admin` without touching
/// the registry. Registered keys fail with a reason when absent,
/// deactivated or expired; on success their stale counter windows are
/// reset lazily and the refreshed record is returned.
pub async fn validate_api_key(
    pool: &DbPool,
    admin_key: &str,
    token: &str,
) -> Result<Credential, AppError> {
    if is_admin_token(token, admin_key) {
        tracing::debug!("admin key validated [{}]", ApiKey::mask_token(token));
        return Ok(Credential::Admin);
    }

    let record = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?;

    let Some(record) = record else {
        tracing::debug!("unknown api key [{}]", ApiKey::mask_token(token));
        return Err(AppError::InvalidApiKey("API-KEY inválida".to_string()));
    };

    if !record.is_active {
        return Err(AppError::InvalidApiKey("API-KEY desativada".to_string()));
    }

    if let Some(expires_at) = record.expires_at {
        if expires_at < chrono::Utc::now() {
            return Err(AppError::InvalidApiKey("API-KEY expirada".to_string()));
        }
    }

    let refreshed = reset_counters_if_needed(pool, record.id).await?;

    Ok(Credential::Registered(refreshed))
}

/// Reset hourly/daily counters whose reset timestamps have aged out.
///
/// Runs lazily on first access in the new window; there is no background
/// timer. Returns the (possibly updated) row.
async fn reset_counters_if_needed(pool: &DbPool, key_id: Uuid) -> Result<ApiKey, AppError> {
    let record = sqlx::query_as::<_, ApiKey>(
        r#"
        UPDATE api_keys
        SET used_this_hour = CASE
                WHEN last_reset_hour IS NULL OR last_reset_hour < NOW() - INTERVAL '1 hour'
                THEN 0 ELSE used_this_hour END,
            last_reset_hour = CASE
                WHEN last_reset_hour IS NULL OR last_reset_hour < NOW() - INTERVAL '1 hour'
                THEN NOW() ELSE last_reset_hour END,
            used_today = CASE
                WHEN last_reset_day IS NULL OR last_reset_day < NOW() - INTERVAL '1 day'
                THEN 0 ELSE used_today END,
            last_reset_day = CASE
                WHEN last_reset_day IS NULL OR last_reset_day < NOW() - INTERVAL '1 day'
                THEN NOW() ELSE last_reset_day END
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(key_id)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Check quota and commit one unit of usage, atomically.
///
/// The admin credential is always allowed with unlimited remaining. For
/// a registered key the increment is conditioned on both counters still
/// being under their limits inside a single UPDATE; a rejected request
/// never changes the counters. Rejections are audited with the limit
/// that was hit.
pub async fn check_and_increment(
    pool: &DbPool,
    admin_key: &str,
    token: &str,
    client_ip: &str,
    user_agent: &str,
) -> Result<RateCheck, AppError> {
    if is_admin_token(token, admin_key) {
        return Ok(RateCheck {
            remaining_hour: None,
            remaining_day: None,
        });
    }

    let record = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?;

    let Some(record) = record else {
        return Err(AppError::InvalidApiKey(
            "API-KEY inválida ou desativada".to_string(),
        ));
    };
    if !record.is_active {
        return Err(AppError::InvalidApiKey(
            "API-KEY inválida ou desativada".to_string(),
        ));
    }

    let record = reset_counters_if_needed(pool, record.id).await?;

    // Conditional increment: the WHERE clause re-checks both limits, so
    // the read above only informs the rejection path.
    let committed = sqlx::query_as::<_, (i64, i64)>(
        r#"
        UPDATE api_keys
        SET used_this_hour = used_this_hour + 1,
            used_today = used_today + 1,
            total_requests = total_requests + 1,
            updated_at = NOW()
        WHERE id = $1
          AND used_this_hour < rate_limit
          AND used_today < daily_limit
        RETURNING (rate_limit - used_this_hour)::BIGINT, (daily_limit - used_today)::BIGINT
        "#,
    )
    .bind(record.id)
    .fetch_optional(pool)
    .await?;

    if let Some((remaining_hour, remaining_day)) = committed {
        return Ok(RateCheck {
            remaining_hour: Some(remaining_hour),
            remaining_day: Some(remaining_day),
        });
    }

    // Rejected without incrementing; figure out which window is exhausted.
    let hour_exhausted = record.used_this_hour >= record.rate_limit;
    let remaining_hour = i64::from(record.rate_limit - record.used_this_hour - 1).max(0);
    let remaining_day = i64::from(record.daily_limit - record.used_today - 1).max(0);

    if hour_exhausted {
        tracing::warn!(
            "hourly rate limit hit [{}]: {}",
            ApiKey::mask_token(token),
            sanitize_for_logging(client_ip)
        );
        audit(
            pool,
            admin_key,
            token,
            AuditAction::RateLimitHour,
            Some("consultas"),
            Some(client_ip),
            Some(user_agent),
            false,
            json!({ "rateLimit": record.rate_limit, "used": record.used_this_hour + 1 }),
        )
        .await;

        Err(AppError::RateLimitExceeded {
            message: "Limite de requisições por hora excedido".to_string(),
            remaining_hour: 0,
            remaining_day,
        })
    } else {
        tracing::warn!(
            "daily rate limit hit [{}]: {}",
            ApiKey::mask_token(token),
            sanitize_for_logging(client_ip)
        );
        audit(
            pool,
            admin_key,
            token,
            AuditAction::RateLimitDay,
            Some("consultas"),
            Some(client_ip),
            Some(user_agent),
            false,
            json!({ "rateLimit": record.daily_limit, "used": record.used_today + 1 }),
        )
        .await;

        Err(AppError::RateLimitExceeded {
            message: "Limite de requisições por dia excedido".to_string(),
            remaining_hour,
            remaining_day: 0,
        })
    }
}

/// Create a new API key.
///
/// # Validation
///
/// - name: 3-50 characters
/// - tier: standard | premium | admin
/// - hourly limit in [10, 1000], daily limit in [100, 10000]
///
/// Returns the raw token; this is the only time it is exposed. The audit
/// entry keeps just a short suffix.
pub async fn create_api_key(
    pool: &DbPool,
    admin_key: &str,
    nome: &str,
    tier: &str,
    rate_limit: i32,
    daily_limit: i32,
    created_by: &str,
) -> Result<String, AppError> {
    if nome.chars().count() < 3 || nome.chars().count() > 50 {
        return Err(AppError::InvalidRequest(
            "Nome deve ter entre 3 e 50 caracteres".to_string(),
        ));
    }

    let tier = KeyTier::parse(tier).map_err(AppError::InvalidRequest)?;

    if !(10..=1000).contains(&rate_limit) {
        return Err(AppError::InvalidRequest(
            "Rate limit por hora deve estar entre 10 e 1000".to_string(),
        ));
    }

    if !(100..=10000).contains(&daily_limit) {
        return Err(AppError::InvalidRequest(
            "Rate limit por dia deve estar entre 100 e 10000".to_string(),
        ));
    }

    let token = SecurityLedger::issue_nonce(TOKEN_LENGTH);

    sqlx::query(
        r#"
        INSERT INTO api_keys (key, nome, tier, is_active, rate_limit, daily_limit, created_by)
        VALUES ($1, $2, $3, true, $4, $5, $6)
        "#,
    )
    .bind(&token)
    .bind(nome)
    .bind(tier.as_str())
    .bind(rate_limit)
    .bind(daily_limit)
    .bind(created_by)
    .execute(pool)
    .await?;

    tracing::info!("new api key created: {} ({})", nome, tier.as_str());

    audit(
        pool,
        admin_key,
        admin_key,
        AuditAction::CreateApiKey,
        Some(tier.as_str()),
        None,
        None,
        true,
        json!({
            "nome": nome,
            "tipo": tier.as_str(),
            "rateLimit": rate_limit,
            "dailyLimit": daily_limit,
            "key": format!("***{}", &token[TOKEN_LENGTH - 4..]),
        }),
    )
    .await;

    Ok(token)
}

/// Flip a key's active flag. Returns the new status.
pub async fn toggle_api_key(pool: &DbPool, admin_key: &str, key_id: Uuid) -> Result<bool, AppError> {
    let record = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
        .bind(key_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::KeyNotFound)?;

    let new_status = !record.is_active;

    sqlx::query("UPDATE api_keys SET is_active = $1, updated_at = NOW() WHERE id = $2")
        .bind(new_status)
        .bind(key_id)
        .execute(pool)
        .await?;

    tracing::info!(
        "api key {}: {}",
        if new_status { "activated" } else { "deactivated" },
        record.nome
    );

    audit(
        pool,
        admin_key,
        admin_key,
        AuditAction::ToggleApiKey,
        Some("admin"),
        None,
        None,
        true,
        json!({
            "keyId": key_id,
            "novoStatus": if new_status { "ativo" } else { "inativo" },
            "nome": record.nome,
        }),
    )
    .await;

    Ok(new_status)
}

/// Remove a key. Deleting the administrator credential is forbidden.
pub async fn delete_api_key(pool: &DbPool, admin_key: &str, key_id: Uuid) -> Result<(), AppError> {
    let record = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
        .bind(key_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::KeyNotFound)?;

    // The admin credential never lives in the registry, but guard the
    // lifecycle anyway in case a row was seeded with the same token.
    if is_admin_token(&record.key, admin_key) {
        tracing::error!("attempt to delete the admin credential");
        return Err(AppError::AdminKeyProtected);
    }

    sqlx::query("DELETE FROM api_keys WHERE id = $1")
        .bind(key_id)
        .execute(pool)
        .await?;

    tracing::info!("api key removed: {}", record.nome);

    audit(
        pool,
        admin_key,
        admin_key,
        AuditAction::DeleteApiKey,
        Some("admin"),
        None,
        None,
        true,
        json!({ "keyId": key_id, "nome": record.nome }),
    )
    .await;

    Ok(())
}

/// List all registry rows with every token masked.
pub async fn list_api_keys(pool: &DbPool, admin_key: &str) -> Result<Vec<ApiKeyResponse>, AppError> {
    let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;

    Ok(keys
        .into_iter()
        .map(|k| {
            let masked = mask_key(&k.key, admin_key);
            let mut response = ApiKeyResponse::from(k);
            response.key = masked;
            response
        })
        .collect())
}

/// Append an audit log entry.
///
/// The key token is masked, ip/user-agent are sanitized and any cpf or
/// numero field inside `detalhes` is masked before the row is written.
/// Logging failures are swallowed and reported locally; they must never
/// abort the pipeline.
#[allow(clippy::too_many_arguments)]
pub async fn audit(
    pool: &DbPool,
    admin_key: &str,
    key_token: &str,
    action: AuditAction,
    tipo: Option<&str>,
    ip: Option<&str>,
    user_agent: Option<&str>,
    sucesso: bool,
    detalhes: serde_json::Value,
) {
    let masked_key = mask_key(key_token, admin_key);
    let sanitized_ip = ip.map(sanitize_for_logging).unwrap_or_else(|| "unknown".to_string());
    let sanitized_ua = user_agent
        .map(sanitize_for_logging)
        .unwrap_or_else(|| "unknown".to_string());
    let sanitized_detalhes = mask_sensitive(detalhes, &["cpf", "numero"]);

    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs (api_key_id, acao, tipo, ip, user_agent, sucesso, detalhes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&masked_key)
    .bind(action.as_str())
    .bind(tipo)
    .bind(&sanitized_ip)
    .bind(&sanitized_ua)
    .bind(sucesso)
    .bind(&sanitized_detalhes)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!("failed to write audit log entry: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_token_comparison_matches_exact_token_only() {
        assert!(is_admin_token("secret-admin-key", "secret-admin-key"));
        assert!(!is_admin_token("secret-admin-kez", "secret-admin-key"));
        assert!(!is_admin_token("secret", "secret-admin-key"));
    }

    #[test]
    fn mask_key_uses_sentinel_for_admin() {
        assert_eq!(mask_key("secret-admin-key", "secret-admin-key"), "ADMIN_KEY");
        assert_eq!(
            mask_key("abcd1234efgh5678", "secret-admin-key"),
            "abcd****5678"
        );
    }
}
