//! Request-token deduplication for creates.
//!
//! The first create carrying a token records `(tenant, token) -> entity` in the
//! same transaction as the entity itself. A later create with the same token
//! gets the recorded entity back instead of a second one.

use crate::error::CoreError;
use crate::services::metrics::DB_QUERY_DURATION;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Invoice,
    Payment,
    Purchase,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Invoice => "invoice",
            EntityKind::Payment => "payment",
            EntityKind::Purchase => "purchase",
        }
    }
}

/// Entity previously created under `token`, if any.
#[instrument(skip(conn, token), fields(tenant_id = %tenant_id, entity_type = kind.as_str()))]
pub async fn check(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    token: &str,
    kind: EntityKind,
) -> Result<Option<Uuid>, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["idempotency_check"])
        .start_timer();

    let existing = sqlx::query_as::<_, (String, Uuid)>(
        r#"
        SELECT entity_type, entity_id FROM idempotency_keys
        WHERE tenant_id = $1 AND request_token = $2
        "#,
    )
    .bind(tenant_id)
    .bind(token)
    .fetch_optional(&mut *conn)
    .await?;

    timer.observe_duration();

    match existing {
        Some((entity_type, _)) if entity_type != kind.as_str() => Err(CoreError::Validation(
            format!("request token already used for a {}", entity_type),
        )),
        Some((_, entity_id)) => Ok(Some(entity_id)),
        None => Ok(None),
    }
}

/// Record `token -> entity_id`. Returns `false` when a concurrent request
/// claimed the token first; the caller must roll back and replay.
#[instrument(skip(conn, token), fields(tenant_id = %tenant_id, entity_id = %entity_id))]
pub async fn persist(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    token: &str,
    kind: EntityKind,
    entity_id: Uuid,
) -> Result<bool, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["idempotency_persist"])
        .start_timer();

    let inserted = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO idempotency_keys (tenant_id, request_token, entity_type, entity_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (tenant_id, request_token) DO NOTHING
        RETURNING entity_id
        "#,
    )
    .bind(tenant_id)
    .bind(token)
    .bind(kind.as_str())
    .bind(entity_id)
    .fetch_optional(&mut *conn)
    .await?;

    timer.observe_duration();

    Ok(inserted.is_some())
}

/// Blank tokens count as absent.
pub fn normalize(token: Option<&str>) -> Option<&str> {
    token.map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_are_ignored() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some("")), None);
        assert_eq!(normalize(Some("   ")), None);
        assert_eq!(normalize(Some(" abc ")), Some("abc"));
    }
}
