//! Cached upstream result model.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A memoized upstream result.
///
/// Maps to the `cache_entries` table. At most one live (non-expired)
/// entry exists per (tipo, query) pair, backed by a UNIQUE constraint.
/// The query is stored normalized (trimmed, upper-cased).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CacheEntry {
    pub id: Uuid,
    pub tipo: String,
    pub query: String,
    pub resultado: serde_json::Value,
    pub sucesso: bool,

    /// Latency of the upstream fetch that produced this entry, in ms.
    pub tempo_resposta: i64,

    /// Incremented on every cache read.
    pub hit_count: i64,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
