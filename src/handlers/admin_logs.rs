//! Admin audit-log browsing.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{error::AppError, models::audit_log::AuditLog, AppState};

const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Optional filter on the action tag.
    pub acao: Option<String>,

    /// Optional filter on the query type.
    pub tipo: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

/// `GET /api/admin/logs` — newest-first page of audit entries, with
/// optional action/type filters.
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * limit;

    let logs: Vec<AuditLog> = sqlx::query_as(
        r#"
        SELECT * FROM audit_logs
        WHERE ($1::TEXT IS NULL OR acao = $1)
          AND ($2::TEXT IS NULL OR tipo = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(&query.acao)
    .bind(&query.tipo)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM audit_logs
        WHERE ($1::TEXT IS NULL OR acao = $1)
          AND ($2::TEXT IS NULL OR tipo = $2)
        "#,
    )
    .bind(&query.acao)
    .bind(&query.tipo)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "logs": logs,
        "page": page,
        "limit": limit,
        "total": total,
    })))
}
