//! Admin security surface: the aggregate threat report and the manual
//! maintenance actions.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppError,
    models::audit_log::{AuditLog, SECURITY_ACTIONS},
    services::cache_service,
    AppState,
};

/// Weight of one occurrence of each security action in the threat score.
fn action_weight(acao: &str) -> i64 {
    match acao {
        "sql_injection_detected" => 10,
        "replay_attack_detected" => 8,
        "flood_attack_detected" => 6,
        "unauthorized_access" => 5,
        "rate_limit_hour" | "rate_limit_day" => 2,
        _ => 1,
    }
}

fn threat_level(score: i64) -> &'static str {
    match score {
        0 => "SEGURO",
        1..=19 => "BAIXO",
        20..=49 => "MÉDIO",
        50..=99 => "ALTO",
        _ => "CRÍTICO",
    }
}

/// `GET /api/admin/security` — 24h attack counters, weighted threat
/// score, protection-system states, cache metrics and the most recent
/// security-tagged audit entries.
pub async fn security_report(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let actions: Vec<String> = SECURITY_ACTIONS.iter().map(|a| a.to_string()).collect();

    let counts: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT acao, COUNT(*) FROM audit_logs
        WHERE acao = ANY($1) AND created_at > NOW() - INTERVAL '24 hours'
        GROUP BY acao
        "#,
    )
    .bind(&actions)
    .fetch_all(&state.pool)
    .await?;

    let threat_score: i64 = counts
        .iter()
        .map(|(acao, count)| action_weight(acao) * count)
        .sum();

    let mut attacks = serde_json::Map::new();
    for action in &actions {
        let count = counts
            .iter()
            .find(|(acao, _)| acao == action)
            .map(|(_, c)| *c)
            .unwrap_or(0);
        attacks.insert(action.clone(), json!(count));
    }

    let recent: Vec<AuditLog> = sqlx::query_as(
        r#"
        SELECT * FROM audit_logs
        WHERE acao = ANY($1)
        ORDER BY created_at DESC
        LIMIT 10
        "#,
    )
    .bind(&actions)
    .fetch_all(&state.pool)
    .await?;

    let cache = cache_service::stats(&state.pool).await?;
    let ledger = state.ledger.stats();

    Ok(Json(json!({
        "success": true,
        "threatScore": threat_score,
        "threatLevel": threat_level(threat_score),
        "attacks": attacks,
        "protectionSystems": {
            "antiSqlInjection": "ATIVO",
            "antiReplay": "ATIVO",
            "antiFlood": "ATIVO",
            "integrityCheck": "ATIVO",
        },
        "cache": cache,
        "ledger": ledger,
        "recentEvents": recent,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub action: String,
}

/// `POST /api/admin/security` — run one maintenance action.
pub async fn maintenance(
    State(state): State<AppState>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<Json<Value>, AppError> {
    match request.action.as_str() {
        "clear_expired_nonces" => {
            let removed = state.ledger.sweep_expired();
            Ok(Json(json!({
                "success": true,
                "action": request.action,
                "removed": removed,
            })))
        }
        "clear_security_cache" => {
            state.ledger.clear_all();
            Ok(Json(json!({
                "success": true,
                "action": request.action,
            })))
        }
        "clear_all_cache" => {
            let removed = cache_service::flush_all(&state.pool).await?;
            Ok(Json(json!({
                "success": true,
                "action": request.action,
                "removed": removed,
            })))
        }
        other => Err(AppError::InvalidRequest(format!(
            "Ação desconhecida: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_rank_injection_highest() {
        assert!(action_weight("sql_injection_detected") > action_weight("replay_attack_detected"));
        assert!(action_weight("replay_attack_detected") > action_weight("rate_limit_hour"));
    }

    #[test]
    fn levels_follow_the_score() {
        assert_eq!(threat_level(0), "SEGURO");
        assert_eq!(threat_level(5), "BAIXO");
        assert_eq!(threat_level(30), "MÉDIO");
        assert_eq!(threat_level(70), "ALTO");
        assert_eq!(threat_level(500), "CRÍTICO");
    }
}
