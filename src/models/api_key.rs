//! API key model and credential resolution types.
//!
//! Keys are bearer tokens granting query rights with hourly and daily
//! quotas. The administrator credential is configured out-of-band (env)
//! and is never stored as a registry row; it is represented by the
//! `Credential::Admin` variant instead of a magic-string comparison
//! scattered across the codebase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel used wherever the admin credential would otherwise be masked.
pub const ADMIN_KEY_SENTINEL: &str = "ADMIN_KEY";

/// Represents an API key record from the database.
///
/// Maps to the `api_keys` table. The `key` column holds the raw token;
/// it is masked by every read path that leaves the service layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// The raw bearer token. UNIQUE across the registry.
    pub key: String,

    /// Human-readable display name (3-50 characters).
    pub nome: String,

    /// Quota tier: standard | premium | admin.
    pub tier: String,

    /// Inactive keys are rejected during authentication. This provides a
    /// way to revoke access without deleting the record.
    pub is_active: bool,

    /// Hourly quota.
    pub rate_limit: i32,

    /// Daily quota.
    pub daily_limit: i32,

    /// Lifetime accepted-request counter.
    pub total_requests: i64,

    pub used_this_hour: i32,
    pub used_today: i32,

    /// Counters reset lazily when these timestamps age past the window,
    /// on first access in the new window. No background timer.
    pub last_reset_hour: Option<DateTime<Utc>>,
    pub last_reset_day: Option<DateTime<Utc>>,

    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Mask a token to its first-4/last-4 characters.
    ///
    /// Counts characters, not bytes: credentials arrive from a query
    /// parameter and may carry arbitrary UTF-8, which must never panic
    /// the masking path.
    pub fn mask_token(token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let prefix: String = chars[..4].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{prefix}****{suffix}")
    }
}

/// Quota tiers recognized at key creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTier {
    Standard,
    Premium,
    Admin,
}

impl KeyTier {
    /// Parse a tier name; rejection message lists the accepted values.
    pub fn parse(raw: &str) -> Result<KeyTier, String> {
        match raw {
            "standard" => Ok(KeyTier::Standard),
            "premium" => Ok(KeyTier::Premium),
            "admin" => Ok(KeyTier::Admin),
            _ => Err("Tipo inválido. Tipos disponíveis: premium, standard, admin".to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyTier::Standard => "standard",
            KeyTier::Premium => "premium",
            KeyTier::Admin => "admin",
        }
    }
}

/// Outcome of credential validation.
///
/// The admin credential bypasses quota entirely and never resolves to a
/// registry row; every downstream decision branches on this enum once,
/// at validation time.
#[derive(Debug, Clone)]
pub enum Credential {
    Admin,
    Registered(ApiKey),
}

impl Credential {
    pub fn is_admin(&self) -> bool {
        matches!(self, Credential::Admin)
    }
}

/// Request body for creating a new API key (admin only).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub nome: String,

    /// Tier name: standard | premium | admin.
    pub tipo: String,

    #[serde(default = "default_rate_limit")]
    pub rate_limit: i32,

    #[serde(default = "default_daily_limit")]
    pub daily_limit: i32,
}

fn default_rate_limit() -> i32 {
    100
}

fn default_daily_limit() -> i32 {
    1000
}

/// A registry row as exposed to the admin listing: the token is always
/// masked (or replaced by the admin sentinel).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub key: String,
    pub nome: String,
    pub tier: String,
    pub is_active: bool,
    pub rate_limit: i32,
    pub daily_limit: i32,
    pub total_requests: i64,
    pub used_this_hour: i32,
    pub used_today: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(k: ApiKey) -> Self {
        let masked = ApiKey::mask_token(&k.key);
        ApiKeyResponse {
            id: k.id,
            key: masked,
            nome: k.nome,
            tier: k.tier,
            is_active: k.is_active,
            rate_limit: k.rate_limit,
            daily_limit: k.daily_limit,
            total_requests: k.total_requests,
            used_this_hour: k.used_this_hour,
            used_today: k.used_today,
            expires_at: k.expires_at,
            created_by: k.created_by,
            created_at: k.created_at,
            updated_at: k.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_token_keeps_prefix_and_suffix() {
        assert_eq!(
            ApiKey::mask_token("abcd1234efgh5678"),
            "abcd****5678".to_string()
        );
    }

    #[test]
    fn mask_token_hides_short_tokens_entirely() {
        assert_eq!(ApiKey::mask_token("short"), "****".to_string());
    }

    #[test]
    fn mask_token_handles_multibyte_credentials() {
        // Presented credentials come straight from a query parameter and
        // can be arbitrary UTF-8; masking must count chars, not bytes.
        assert_eq!(ApiKey::mask_token("あああ"), "****".to_string());
        assert_eq!(ApiKey::mask_token("ああああああああああ"), "ああああ****ああああ");
        assert_eq!(ApiKey::mask_token("áéíóú1234"), "áéíó****1234");
    }

    #[test]
    fn tier_parse_rejects_unknown_names() {
        assert!(KeyTier::parse("gold").is_err());
        assert_eq!(KeyTier::parse("premium"), Ok(KeyTier::Premium));
    }
}
