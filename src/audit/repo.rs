use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::warn;

/// One row of the append-only audit trail. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: Option<i64>, // null for anonymous failures
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Append one audit entry. A failed write is logged and swallowed so it
/// never blocks the operation that triggered it.
pub async fn record(
    db: &PgPool,
    action: &str,
    actor_id: Option<i64>,
    entity_type: Option<&str>,
    entity_id: Option<i64>,
    details: serde_json::Value,
    ip_address: Option<&str>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (actor_id, action, entity_type, entity_id, details, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(actor_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(details)
    .bind(ip_address)
    .execute(db)
    .await;

    if let Err(e) = result {
        warn!(error = %e, action, "audit write failed");
    }
}

/// List audit entries, newest first, with optional equality filters.
pub async fn list(
    db: &PgPool,
    action: Option<&str>,
    actor_id: Option<i64>,
    entity_type: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<AuditEntry>> {
    let entries = sqlx::query_as::<_, AuditEntry>(
        r#"
        SELECT id, actor_id, action, entity_type, entity_id, details, ip_address, created_at
        FROM audit_log
        WHERE ($1::text IS NULL OR action = $1)
          AND ($2::bigint IS NULL OR actor_id = $2)
          AND ($3::text IS NULL OR entity_type = $3)
        ORDER BY id DESC
        LIMIT $4
        "#,
    )
    .bind(action)
    .bind(actor_id)
    .bind(entity_type)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(entries)
}
