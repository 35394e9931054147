//! Party balance derivation.
//!
//! A balance is never adjusted incrementally. It is recomputed from the
//! ledger each time: billed documents minus payments, in minor units.

use crate::error::CoreError;
use crate::models::{PartyType, PartyView, RequestContext};
use crate::services::metrics::{record_outcome, DB_QUERY_DURATION};
use crate::services::money::format_minor;
use crate::services::parties;
use crate::services::shop::ShopService;
use sqlx::PgConnection;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Lock the party row, recompute its balance and store it.
#[instrument(skip(conn), fields(tenant_id = %tenant_id, party_id = %party_id, party_type = %party_type))]
pub async fn recompute(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    party_id: Uuid,
    party_type: PartyType,
) -> Result<i64, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["recompute_balance"])
        .start_timer();

    let locked = sqlx::query_scalar::<_, Uuid>(&format!(
        "SELECT {id} FROM {table} WHERE tenant_id = $1 AND {id} = $2 FOR UPDATE",
        id = party_type.id_column(),
        table = party_type.table(),
    ))
    .bind(tenant_id)
    .bind(party_id)
    .fetch_optional(&mut *conn)
    .await?;

    if locked.is_none() {
        return Err(CoreError::NotFound(format!(
            "{} {}",
            party_type.as_str().to_lowercase(),
            party_id
        )));
    }

    let billed_sql = match party_type {
        PartyType::Customer => {
            r#"
            SELECT COALESCE(SUM(t.grand_total), 0)::BIGINT
            FROM invoices i
            JOIN invoice_totals t ON t.invoice_id = i.invoice_id
            WHERE i.tenant_id = $1 AND i.customer_id = $2 AND i.deleted_utc IS NULL
            "#
        }
        PartyType::Vendor => {
            r#"
            SELECT COALESCE(SUM(grand_total), 0)::BIGINT
            FROM purchases
            WHERE tenant_id = $1 AND vendor_id = $2 AND deleted_utc IS NULL
            "#
        }
    };

    let billed = sqlx::query_scalar::<_, i64>(billed_sql)
        .bind(tenant_id)
        .bind(party_id)
        .fetch_one(&mut *conn)
        .await?;

    let paid = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(amount), 0)::BIGINT
        FROM payments
        WHERE tenant_id = $1 AND party_type = $2 AND party_id = $3
        "#,
    )
    .bind(tenant_id)
    .bind(party_type.as_str())
    .bind(party_id)
    .fetch_one(&mut *conn)
    .await?;

    let balance = billed
        .checked_sub(paid)
        .ok_or_else(|| CoreError::InvalidMonetaryInput("balance out of range".into()))?;

    sqlx::query(&format!(
        "UPDATE {table} SET balance = $3, balance_display = $4, updated_utc = NOW() \
         WHERE tenant_id = $1 AND {id} = $2",
        id = party_type.id_column(),
        table = party_type.table(),
    ))
    .bind(tenant_id)
    .bind(party_id)
    .bind(balance)
    .bind(format_minor(balance))
    .execute(&mut *conn)
    .await?;

    timer.observe_duration();

    debug!(billed = billed, paid = paid, balance = balance, "Balance recomputed");

    Ok(balance)
}

impl ShopService {
    /// Rebuild a party's cached balance from its ledger.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, party_id = %party_id))]
    pub async fn recompute_balance(
        &self,
        ctx: &RequestContext,
        party_type: PartyType,
        party_id: Uuid,
    ) -> Result<PartyView, CoreError> {
        let result: Result<PartyView, CoreError> = async {
            let mut tx = self.db.begin().await?;
            recompute(&mut tx, ctx.tenant_id, party_id, party_type).await?;
            let row = parties::load_party(&mut tx, ctx.tenant_id, party_type, party_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("party {}", party_id)))?;
            tx.commit().await?;
            Ok(PartyView::from_row(party_type, row))
        }
        .await;

        record_outcome("recompute_balance", &result);

        if let Ok(view) = &result {
            info!(balance = %view.balance, "Party balance rebuilt");
        }
        result
    }
}
