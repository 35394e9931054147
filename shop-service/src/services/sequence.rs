//! Per-tenant document numbering.
//!
//! One row per (tenant, counter) in `sequences`. A draw is a single
//! `UPDATE ... RETURNING`, so the row lock serialises concurrent draws and a
//! rolled-back transaction hands its number back.

use crate::error::CoreError;
use crate::services::metrics::DB_QUERY_DURATION;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

/// Named counters each tenant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKey {
    Invoice,
    Proforma,
    Lending,
    Purchase,
    Payment,
}

impl CounterKey {
    pub const ALL: [CounterKey; 5] = [
        CounterKey::Invoice,
        CounterKey::Proforma,
        CounterKey::Lending,
        CounterKey::Purchase,
        CounterKey::Payment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKey::Invoice => "invoice",
            CounterKey::Proforma => "proforma",
            CounterKey::Lending => "lending",
            CounterKey::Purchase => "purchase",
            CounterKey::Payment => "payment",
        }
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Draw the next value for `key` inside the caller's transaction.
#[instrument(skip(conn), fields(tenant_id = %tenant_id, counter_key = %key))]
pub async fn next_sequence(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    key: CounterKey,
) -> Result<i64, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["next_sequence"])
        .start_timer();

    let value = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE sequences
        SET value = value + 1
        WHERE tenant_id = $1 AND counter_key = $2
        RETURNING value
        "#,
    )
    .bind(tenant_id)
    .bind(key.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    timer.observe_duration();

    value.ok_or_else(|| CoreError::SequenceNotInitialized {
        tenant_id,
        counter_key: key.as_str().to_string(),
    })
}

/// `{prefix}/{year}/{value}` with the value zero-padded to `width` digits.
pub fn format_document_number(prefix: &str, width: usize, year: i32, value: i64) -> String {
    format!("{}/{}/{:0width$}", prefix, year, value, width = width)
}

/// Draw and format in one step. `year` is stamped as given; the counter
/// itself never resets.
pub async fn next_document_number(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    key: CounterKey,
    prefix: &str,
    width: usize,
    year: i32,
) -> Result<String, CoreError> {
    let value = next_sequence(conn, tenant_id, key).await?;
    Ok(format_document_number(prefix, width, year, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_value_to_width() {
        assert_eq!(format_document_number("INV", 4, 2026, 7), "INV/2026/0007");
        assert_eq!(format_document_number("PAY", 6, 2026, 42), "PAY/2026/000042");
    }

    #[test]
    fn wider_values_are_not_truncated() {
        assert_eq!(format_document_number("INV", 4, 2026, 123_456), "INV/2026/123456");
    }

    #[test]
    fn counter_continues_across_year_boundary() {
        // The counter never resets; only the year stamp changes.
        let december = format_document_number("INV", 4, 2025, 41);
        let january = format_document_number("INV", 4, 2026, 42);
        assert_eq!(december, "INV/2025/0041");
        assert_eq!(january, "INV/2026/0042");
    }

    #[test]
    fn counter_keys_are_distinct() {
        let keys: std::collections::HashSet<_> = CounterKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), CounterKey::ALL.len());
    }
}
