//! Response cache service.
//!
//! Maps (tipo, normalized query) to a previously fetched upstream result
//! with a type-specific expiry: CPF data is the most stable (24h), phone
//! numbers churn more (2h) and name lookups are the most volatile (1h).

use std::collections::HashMap;

use chrono::Duration;
use serde::Serialize;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::cache_entry::CacheEntry;
use crate::models::tipo::Tipo;

/// Normalize a raw query for cache addressing: trim and upper-case.
pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Expiry duration for one query kind.
pub fn cache_duration(tipo: Tipo) -> Duration {
    match tipo {
        Tipo::Cpf => Duration::hours(24),
        Tipo::Numero => Duration::hours(2),
        Tipo::Nome => Duration::hours(1),
    }
}

/// Look up a live cache entry.
///
/// The hit counter is incremented as part of the lookup (single UPDATE),
/// and the returned copy carries the updated count. Expired entries are
/// invisible here; the sweep removes them later.
pub async fn get(pool: &DbPool, tipo: Tipo, raw_query: &str) -> Result<Option<CacheEntry>, AppError> {
    let normalized = normalize_query(raw_query);

    let entry = sqlx::query_as::<_, CacheEntry>(
        r#"
        UPDATE cache_entries
        SET hit_count = hit_count + 1
        WHERE tipo = $1 AND query = $2 AND expires_at > NOW()
        RETURNING *
        "#,
    )
    .bind(tipo.as_str())
    .bind(&normalized)
    .fetch_optional(pool)
    .await?;

    Ok(entry)
}

/// Store (or refresh) an upstream result.
///
/// Refresh-on-write: an existing (tipo, query) row is overwritten in
/// place with the new payload, latency and expiry.
pub async fn put(
    pool: &DbPool,
    tipo: Tipo,
    raw_query: &str,
    resultado: &serde_json::Value,
    sucesso: bool,
    tempo_resposta_ms: i64,
) -> Result<(), AppError> {
    let normalized = normalize_query(raw_query);
    let duration = cache_duration(tipo);
    let expires_at = chrono::Utc::now() + duration;

    sqlx::query(
        r#"
        INSERT INTO cache_entries (tipo, query, resultado, sucesso, tempo_resposta, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (tipo, query) DO UPDATE
        SET resultado = EXCLUDED.resultado,
            sucesso = EXCLUDED.sucesso,
            tempo_resposta = EXCLUDED.tempo_resposta,
            expires_at = EXCLUDED.expires_at,
            created_at = NOW()
        "#,
    )
    .bind(tipo.as_str())
    .bind(&normalized)
    .bind(resultado)
    .bind(sucesso)
    .bind(tempo_resposta_ms)
    .bind(expires_at)
    .execute(pool)
    .await?;

    tracing::debug!(
        "cached result: {} - {} (expires in {}s)",
        tipo,
        normalized,
        duration.num_seconds()
    );

    Ok(())
}

/// Remove expired entries. Returns how many were deleted.
pub async fn sweep_expired(pool: &DbPool) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Drop every cache entry. Returns how many were deleted.
pub async fn flush_all(pool: &DbPool) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM cache_entries").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Cache metrics for the admin surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: i64,
    pub by_type: HashMap<String, i64>,
    pub expired_count: i64,
    pub hit_rate: f64,
}

/// Aggregate cache statistics.
///
/// The "hit rate" is cumulative hit counters divided by entry count,
/// times 100 — a lifetime reuse ratio that can exceed 100%, not a true
/// request-level hit/miss rate. External dashboards depend on this
/// scale, so it is reproduced as-is.
pub async fn stats(pool: &DbPool) -> Result<CacheStats, AppError> {
    let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
        .fetch_one(pool)
        .await?;

    let expired_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries WHERE expires_at <= NOW()")
            .fetch_one(pool)
            .await?;

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT tipo, COUNT(*) FROM cache_entries GROUP BY tipo")
            .fetch_all(pool)
            .await?;
    let by_type = rows.into_iter().collect();

    let total_hits: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(hit_count), 0) FROM cache_entries")
            .fetch_one(pool)
            .await?;

    Ok(CacheStats {
        total_entries,
        by_type,
        expired_count,
        hit_rate: hit_rate(total_hits, total_entries),
    })
}

/// Lifetime hits-per-entry percentage, rounded to 2 decimals.
fn hit_rate(total_hits: i64, total_entries: i64) -> f64 {
    if total_entries == 0 {
        return 0.0;
    }
    let rate = (total_hits as f64 / total_entries as f64) * 100.0;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_uppercases() {
        assert_eq!(normalize_query("  maria silva  "), "MARIA SILVA");
        assert_eq!(normalize_query("ABC"), normalize_query(" abc "));
    }

    #[test]
    fn durations_reflect_data_volatility() {
        assert_eq!(cache_duration(Tipo::Cpf), Duration::hours(24));
        assert_eq!(cache_duration(Tipo::Numero), Duration::hours(2));
        assert_eq!(cache_duration(Tipo::Nome), Duration::hours(1));
    }

    #[test]
    fn hit_rate_is_hits_per_entry_and_may_exceed_100() {
        assert_eq!(hit_rate(0, 0), 0.0);
        assert_eq!(hit_rate(1, 2), 50.0);
        // Documented metric quirk: heavy reuse pushes the ratio past 100%.
        assert_eq!(hit_rate(30, 10), 300.0);
        assert_eq!(hit_rate(1, 3), 33.33);
    }
}
