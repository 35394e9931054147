//! Payments, their allocation to invoices, and invoice payment status.

use crate::error::CoreError;
use crate::models::{
    AllocationRow, InvoiceStatus, PartyType, PaymentPayload, PaymentRow, PaymentView,
    RequestContext,
};
use crate::services::hooks::AuditAction;
use crate::services::idempotency::{self, EntityKind};
use crate::services::ledger;
use crate::services::metrics::{record_outcome, DB_QUERY_DURATION, IDEMPOTENT_REPLAYS_TOTAL};
use crate::services::money::to_minor;
use crate::services::parties::require_party;
use crate::services::sequence::CounterKey;
use crate::services::shop::ShopService;
use crate::services::store;
use service_core::utils::strip_markup;
use sqlx::PgConnection;
use std::collections::BTreeMap;
use tracing::{info, instrument};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "payment_id, tenant_id, transaction_number, direction, party_type, \
    party_id, amount, payment_date, mode, notes, created_utc";

/// Status implied by how much of `grand_total` has been allocated.
pub fn derive_status(allocated: i64, grand_total: i64) -> InvoiceStatus {
    if allocated >= grand_total {
        InvoiceStatus::Paid
    } else if allocated > 0 {
        InvoiceStatus::Partial
    } else {
        InvoiceStatus::Unpaid
    }
}

/// Lock an invoice, sum its allocations and store the derived status.
/// Soft-deleted invoices are still updated so their history stays coherent.
#[instrument(skip(conn), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
pub async fn recompute_invoice_status(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<InvoiceStatus, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["recompute_invoice_status"])
        .start_timer();

    let locked = sqlx::query_scalar::<_, Uuid>(
        "SELECT invoice_id FROM invoices WHERE tenant_id = $1 AND invoice_id = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;

    if locked.is_none() {
        return Err(CoreError::NotFound(format!("invoice {}", invoice_id)));
    }

    let (allocated, grand_total) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_allocations
             WHERE tenant_id = $1 AND invoice_id = $2),
            (SELECT COALESCE(MAX(grand_total), 0)::BIGINT FROM invoice_totals
             WHERE tenant_id = $1 AND invoice_id = $2)
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await?;

    let status = derive_status(allocated, grand_total);
    store::set_status(conn, tenant_id, invoice_id, status).await?;

    timer.observe_duration();

    Ok(status)
}

/// Validated payment amounts in minor units. Allocations for the same invoice
/// are merged; the map keeps invoice ids sorted, which fixes lock order.
#[derive(Debug, PartialEq, Eq)]
struct CheckedPayment {
    amount: i64,
    allocations: BTreeMap<Uuid, i64>,
}

fn check_payment(payload: &PaymentPayload) -> Result<CheckedPayment, CoreError> {
    let amount = to_minor(payload.amount)?;
    if amount <= 0 {
        return Err(CoreError::Validation(
            "payment amount must be greater than zero".into(),
        ));
    }

    if payload.party_type == PartyType::Vendor && !payload.allocations.is_empty() {
        return Err(CoreError::Validation(
            "allocations are only allowed on customer payments".into(),
        ));
    }

    let mut allocations = BTreeMap::new();
    let mut allocated: i64 = 0;
    for allocation in &payload.allocations {
        let value = to_minor(allocation.amount)?;
        if value <= 0 {
            return Err(CoreError::Validation(format!(
                "allocation to invoice {} must be greater than zero",
                allocation.invoice_id
            )));
        }
        allocated = allocated
            .checked_add(value)
            .ok_or_else(|| CoreError::InvalidMonetaryInput("allocations out of range".into()))?;
        *allocations.entry(allocation.invoice_id).or_insert(0) += value;
    }

    if allocated > amount {
        return Err(CoreError::Validation(format!(
            "allocations total {} exceeds payment amount {}",
            allocated, amount
        )));
    }

    Ok(CheckedPayment {
        amount,
        allocations,
    })
}

async fn load_payment(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    payment_id: Uuid,
    lock: bool,
) -> Result<Option<PaymentRow>, CoreError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE tenant_id = $1 AND payment_id = $2{}",
        PAYMENT_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(tenant_id)
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

async fn load_allocations(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    payment_ids: &[Uuid],
) -> Result<Vec<AllocationRow>, CoreError> {
    let rows = sqlx::query_as::<_, AllocationRow>(
        r#"
        SELECT allocation_id, tenant_id, payment_id, invoice_id, amount
        FROM payment_allocations
        WHERE tenant_id = $1 AND payment_id = ANY($2)
        ORDER BY invoice_id
        "#,
    )
    .bind(tenant_id)
    .bind(payment_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn payment_view(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    payment_id: Uuid,
) -> Result<Option<PaymentView>, CoreError> {
    let Some(payment) = load_payment(conn, tenant_id, payment_id, false).await? else {
        return Ok(None);
    };
    let allocations = load_allocations(conn, tenant_id, &[payment_id]).await?;
    Ok(Some(PaymentView::from_rows(&payment, &allocations)))
}

impl ShopService {
    /// Record a payment, allocate it to invoices and refresh statuses and the
    /// party balance, all in one transaction.
    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id, party_id = %payload.party_id))]
    pub async fn create_payment(
        &self,
        ctx: &RequestContext,
        payload: &PaymentPayload,
    ) -> Result<PaymentView, CoreError> {
        let result = self.create_payment_tx(ctx, payload).await;
        record_outcome("create_payment", &result);

        let (view, created) = result?;
        if created {
            info!(
                payment_id = %view.id,
                transaction_number = %view.transaction_number,
                amount = %view.amount,
                allocations = view.allocations.len(),
                "Payment created"
            );
            self.after_commit(
                ctx,
                EntityKind::Payment.as_str(),
                view.id,
                AuditAction::Create,
                serde_json::json!({
                    "transactionNumber": view.transaction_number,
                    "amount": view.amount,
                    "partyType": view.party_type,
                    "partyId": view.party_id,
                }),
            );
        }
        Ok(view)
    }

    async fn create_payment_tx(
        &self,
        ctx: &RequestContext,
        payload: &PaymentPayload,
    ) -> Result<(PaymentView, bool), CoreError> {
        let checked = check_payment(payload)?;
        let tenant_id = ctx.tenant_id;
        let token = idempotency::normalize(payload.request_token.as_deref());

        let mut tx = self.db.begin().await?;

        if let Some(token) = token {
            if let Some(existing) =
                idempotency::check(&mut tx, tenant_id, token, EntityKind::Payment).await?
            {
                let view = payment_view(&mut tx, tenant_id, existing).await?;
                tx.rollback().await?;
                return self.replayed_payment(existing, view);
            }
        }

        require_party(&mut tx, tenant_id, payload.party_type, payload.party_id).await?;

        for invoice_id in checked.allocations.keys() {
            let invoice = store::lock_invoice(&mut tx, tenant_id, *invoice_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))?;
            if invoice.customer_id != Some(payload.party_id) {
                return Err(CoreError::Validation(format!(
                    "invoice {} is not billed to customer {}",
                    invoice_id, payload.party_id
                )));
            }
        }

        let payment_id = Uuid::new_v4();
        let transaction_number = self
            .next_number(&mut tx, tenant_id, CounterKey::Payment)
            .await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments (payment_id, tenant_id, transaction_number, direction, \
             party_type, party_id, amount, payment_date, mode, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(tenant_id)
        .bind(&transaction_number)
        .bind(payload.direction.as_str())
        .bind(payload.party_type.as_str())
        .bind(payload.party_id)
        .bind(checked.amount)
        .bind(payload.payment_date)
        .bind(payload.mode.as_deref().map(strip_markup))
        .bind(payload.notes.as_deref().map(strip_markup))
        .fetch_one(&mut *tx)
        .await?;

        let mut allocations = Vec::with_capacity(checked.allocations.len());
        for (invoice_id, amount) in &checked.allocations {
            let allocation = sqlx::query_as::<_, AllocationRow>(
                r#"
                INSERT INTO payment_allocations (allocation_id, tenant_id, payment_id, invoice_id, amount)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING allocation_id, tenant_id, payment_id, invoice_id, amount
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(payment_id)
            .bind(invoice_id)
            .bind(amount)
            .fetch_one(&mut *tx)
            .await?;
            allocations.push(allocation);
        }

        timer.observe_duration();

        if let Some(token) = token {
            if !idempotency::persist(&mut tx, tenant_id, token, EntityKind::Payment, payment_id)
                .await?
            {
                tx.rollback().await?;
                return self.replay_after_race(tenant_id, token).await;
            }
        }

        for invoice_id in checked.allocations.keys() {
            recompute_invoice_status(&mut tx, tenant_id, *invoice_id).await?;
        }
        ledger::recompute(&mut tx, tenant_id, payload.party_id, payload.party_type).await?;

        tx.commit().await?;

        Ok((PaymentView::from_rows(&payment, &allocations), true))
    }

    fn replayed_payment(
        &self,
        payment_id: Uuid,
        view: Option<PaymentView>,
    ) -> Result<(PaymentView, bool), CoreError> {
        IDEMPOTENT_REPLAYS_TOTAL
            .with_label_values(&[EntityKind::Payment.as_str()])
            .inc();
        info!(payment_id = %payment_id, "Replaying idempotent payment create");
        view.map(|v| (v, false))
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payment_id)))
    }

    async fn replay_after_race(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> Result<(PaymentView, bool), CoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let existing = idempotency::check(&mut conn, tenant_id, token, EntityKind::Payment)
            .await?
            .ok_or_else(|| CoreError::ConstraintViolation("request token already used".into()))?;
        let view = payment_view(&mut conn, tenant_id, existing).await?;
        self.replayed_payment(existing, view)
    }

    /// Remove a payment and its allocations, then refresh every invoice it
    /// touched and the party balance.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, payment_id = %payment_id))]
    pub async fn delete_payment(
        &self,
        ctx: &RequestContext,
        payment_id: Uuid,
    ) -> Result<(), CoreError> {
        let result = self.delete_payment_tx(ctx, payment_id).await;
        record_outcome("delete_payment", &result);

        let payment = result?;
        info!(transaction_number = %payment.transaction_number, "Payment deleted");
        self.after_commit(
            ctx,
            EntityKind::Payment.as_str(),
            payment_id,
            AuditAction::Delete,
            serde_json::json!({ "transactionNumber": payment.transaction_number }),
        );
        Ok(())
    }

    async fn delete_payment_tx(
        &self,
        ctx: &RequestContext,
        payment_id: Uuid,
    ) -> Result<PaymentRow, CoreError> {
        let tenant_id = ctx.tenant_id;
        let mut tx = self.db.begin().await?;

        let payment = load_payment(&mut tx, tenant_id, payment_id, true)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payment_id)))?;
        let party_type = payment.parsed_party_type().ok_or_else(|| {
            CoreError::Database(anyhow::anyhow!(
                "payment {} has unknown party type '{}'",
                payment_id,
                payment.party_type
            ))
        })?;

        let mut invoice_ids: Vec<Uuid> = load_allocations(&mut tx, tenant_id, &[payment_id])
            .await?
            .into_iter()
            .map(|a| a.invoice_id)
            .collect();
        invoice_ids.sort();
        invoice_ids.dedup();

        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_payment"])
            .start_timer();

        sqlx::query("DELETE FROM payment_allocations WHERE tenant_id = $1 AND payment_id = $2")
            .bind(tenant_id)
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM payments WHERE tenant_id = $1 AND payment_id = $2")
            .bind(tenant_id)
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;

        timer.observe_duration();

        for invoice_id in &invoice_ids {
            recompute_invoice_status(&mut tx, tenant_id, *invoice_id).await?;
        }
        ledger::recompute(&mut tx, tenant_id, payment.party_id, party_type).await?;

        tx.commit().await?;

        Ok(payment)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, payment_id = %payment_id))]
    pub async fn get_payment(
        &self,
        ctx: &RequestContext,
        payment_id: Uuid,
    ) -> Result<Option<PaymentView>, CoreError> {
        let mut tx = self.db.begin_read().await?;
        let view = payment_view(&mut tx, ctx.tenant_id, payment_id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// All payments recorded against a party, oldest first.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, party_id = %party_id))]
    pub async fn list_payments(
        &self,
        ctx: &RequestContext,
        party_type: PartyType,
        party_id: Uuid,
    ) -> Result<Vec<PaymentView>, CoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let mut tx = self.db.begin_read().await?;

        let payments = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments \
             WHERE tenant_id = $1 AND party_type = $2 AND party_id = $3 \
             ORDER BY payment_date, created_utc, payment_id",
            PAYMENT_COLUMNS
        ))
        .bind(ctx.tenant_id)
        .bind(party_type.as_str())
        .bind(party_id)
        .fetch_all(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = payments.iter().map(|p| p.payment_id).collect();
        let allocations = load_allocations(&mut tx, ctx.tenant_id, &ids).await?;

        tx.commit().await?;
        timer.observe_duration();

        Ok(payments
            .iter()
            .map(|p| PaymentView::from_rows(p, &allocations))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationInput, Direction};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn payload(party_type: PartyType, amount: Decimal, allocations: Vec<(Uuid, Decimal)>) -> PaymentPayload {
        PaymentPayload {
            direction: Direction::In,
            party_type,
            party_id: Uuid::new_v4(),
            amount,
            payment_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            mode: Some("UPI".into()),
            notes: None,
            allocations: allocations
                .into_iter()
                .map(|(invoice_id, amount)| AllocationInput { invoice_id, amount })
                .collect(),
            request_token: None,
        }
    }

    #[test]
    fn status_follows_allocated_amount() {
        assert_eq!(derive_status(4_000, 10_000), InvoiceStatus::Partial);
        assert_eq!(derive_status(10_000, 10_000), InvoiceStatus::Paid);
        assert_eq!(derive_status(12_000, 10_000), InvoiceStatus::Paid);
        assert_eq!(derive_status(0, 10_000), InvoiceStatus::Unpaid);
    }

    #[test]
    fn zero_total_invoice_is_paid() {
        assert_eq!(derive_status(0, 0), InvoiceStatus::Paid);
    }

    #[test]
    fn merges_allocations_per_invoice() {
        let invoice = Uuid::new_v4();
        let checked = check_payment(&payload(
            PartyType::Customer,
            Decimal::new(100_000, 2),
            vec![
                (invoice, Decimal::new(30_000, 2)),
                (invoice, Decimal::new(20_000, 2)),
            ],
        ))
        .unwrap();

        assert_eq!(checked.amount, 100_000);
        assert_eq!(checked.allocations.get(&invoice), Some(&50_000));
    }

    #[test]
    fn partial_allocation_is_allowed() {
        let checked = check_payment(&payload(
            PartyType::Customer,
            Decimal::new(100_000, 2),
            vec![(Uuid::new_v4(), Decimal::new(40_000, 2))],
        ))
        .unwrap();
        assert_eq!(checked.allocations.values().sum::<i64>(), 40_000);
    }

    #[test]
    fn rejects_over_allocation() {
        let err = check_payment(&payload(
            PartyType::Customer,
            Decimal::new(100, 0),
            vec![
                (Uuid::new_v4(), Decimal::new(60, 0)),
                (Uuid::new_v4(), Decimal::new(41, 0)),
            ],
        ))
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejects_non_positive_amounts() {
        for amount in [Decimal::ZERO, Decimal::new(-5, 0), Decimal::new(4, 3)] {
            let err = check_payment(&payload(PartyType::Customer, amount, vec![])).unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)), "{}", amount);
        }

        let err = check_payment(&payload(
            PartyType::Customer,
            Decimal::new(100, 0),
            vec![(Uuid::new_v4(), Decimal::ZERO)],
        ))
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn vendor_payments_cannot_allocate() {
        let err = check_payment(&payload(
            PartyType::Vendor,
            Decimal::new(100, 0),
            vec![(Uuid::new_v4(), Decimal::new(10, 0))],
        ))
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        assert!(check_payment(&payload(PartyType::Vendor, Decimal::new(100, 0), vec![])).is_ok());
    }
}
