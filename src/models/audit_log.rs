//! Audit log model.
//!
//! Append-only record of every pipeline decision. Rows are written with
//! masked credentials and masked query values; they are never updated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Action tags recorded by the pipeline and the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Consulta,
    CacheHit,
    RateLimitHour,
    RateLimitDay,
    InvalidTipo,
    InvalidInputValidation,
    UnauthorizedAccess,
    CreateApiKey,
    ToggleApiKey,
    DeleteApiKey,
    SqlInjectionDetected,
    ReplayAttackDetected,
    FloodAttackDetected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Consulta => "consulta",
            AuditAction::CacheHit => "cache_hit",
            AuditAction::RateLimitHour => "rate_limit_hour",
            AuditAction::RateLimitDay => "rate_limit_day",
            AuditAction::InvalidTipo => "invalid_tipo",
            AuditAction::InvalidInputValidation => "invalid_input_validation",
            AuditAction::UnauthorizedAccess => "unauthorized_access",
            AuditAction::CreateApiKey => "create_api_key",
            AuditAction::ToggleApiKey => "toggle_api_key",
            AuditAction::DeleteApiKey => "delete_api_key",
            AuditAction::SqlInjectionDetected => "sql_injection_detected",
            AuditAction::ReplayAttackDetected => "replay_attack_detected",
            AuditAction::FloodAttackDetected => "flood_attack_detected",
        }
    }
}

/// Action tags counted as security events by the threat report.
pub const SECURITY_ACTIONS: [&str; 7] = [
    "sql_injection_detected",
    "replay_attack_detected",
    "flood_attack_detected",
    "rate_limit_hour",
    "rate_limit_day",
    "unauthorized_access",
    "invalid_input_validation",
];

/// An audit log row.
///
/// `api_key_id` holds the masked token (or the admin sentinel), never a
/// raw credential. `detalhes` is an opaque JSON blob whose sensitive
/// fields were masked before the row was constructed.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub api_key_id: String,
    pub acao: String,
    pub tipo: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub sucesso: bool,
    pub detalhes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
