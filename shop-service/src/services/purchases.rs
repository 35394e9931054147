//! Vendor bills. Only their totals are kept; they feed the vendor balance.

use crate::error::CoreError;
use crate::models::{PartyType, PurchasePayload, PurchaseRow, PurchaseView, RequestContext};
use crate::services::aggregate::taxable_lines;
use crate::services::hooks::AuditAction;
use crate::services::idempotency::{self, EntityKind};
use crate::services::ledger;
use crate::services::metrics::{record_outcome, DB_QUERY_DURATION, IDEMPOTENT_REPLAYS_TOTAL};
use crate::services::money::compute;
use crate::services::parties::require_party;
use crate::services::sequence::CounterKey;
use crate::services::shop::ShopService;
use service_core::utils::strip_markup;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const PURCHASE_COLUMNS: &str = "purchase_id, tenant_id, purchase_number, vendor_id, bill_date, \
    notes, subtotal, tax_total, round_off, grand_total, deleted_utc, created_utc";

async fn load_purchase(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    purchase_id: Uuid,
) -> Result<Option<PurchaseRow>, CoreError> {
    let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        "SELECT {} FROM purchases \
         WHERE tenant_id = $1 AND purchase_id = $2 AND deleted_utc IS NULL",
        PURCHASE_COLUMNS
    ))
    .bind(tenant_id)
    .bind(purchase_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

fn replayed(purchase_id: Uuid, row: Option<PurchaseRow>) -> Result<(PurchaseView, bool), CoreError> {
    IDEMPOTENT_REPLAYS_TOTAL
        .with_label_values(&[EntityKind::Purchase.as_str()])
        .inc();
    info!(purchase_id = %purchase_id, "Replaying idempotent purchase create");
    row.map(|r| (PurchaseView::from(&r), false))
        .ok_or_else(|| CoreError::NotFound(format!("purchase {}", purchase_id)))
}

impl ShopService {
    /// Record a vendor bill and refresh the vendor's balance.
    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id, vendor_id = %payload.vendor_id))]
    pub async fn create_purchase(
        &self,
        ctx: &RequestContext,
        payload: &PurchasePayload,
    ) -> Result<PurchaseView, CoreError> {
        let result = self.create_purchase_tx(ctx, payload).await;
        record_outcome("create_purchase", &result);

        let (view, created) = result?;
        if created {
            info!(
                purchase_id = %view.id,
                purchase_number = %view.purchase_number,
                grand_total = %view.grand_total,
                "Purchase created"
            );
            self.after_commit(
                ctx,
                EntityKind::Purchase.as_str(),
                view.id,
                AuditAction::Create,
                serde_json::json!({
                    "purchaseNumber": view.purchase_number,
                    "vendorId": view.vendor_id,
                    "grandTotal": view.grand_total,
                }),
            );
        }
        Ok(view)
    }

    async fn create_purchase_tx(
        &self,
        ctx: &RequestContext,
        payload: &PurchasePayload,
    ) -> Result<(PurchaseView, bool), CoreError> {
        let tenant_id = ctx.tenant_id;
        let token = idempotency::normalize(payload.request_token.as_deref());

        let mut tx = self.db.begin().await?;

        if let Some(token) = token {
            if let Some(existing) =
                idempotency::check(&mut tx, tenant_id, token, EntityKind::Purchase).await?
            {
                let row = load_purchase(&mut tx, tenant_id, existing).await?;
                tx.rollback().await?;
                return replayed(existing, row);
            }
        }

        require_party(&mut tx, tenant_id, PartyType::Vendor, payload.vendor_id).await?;

        let supply = self.supply_policy.supply_kind(tenant_id, None);
        let totals = compute(&taxable_lines(&payload.items), supply)?.totals;

        let purchase_id = Uuid::new_v4();
        let purchase_number = self
            .next_number(&mut tx, tenant_id, CounterKey::Purchase)
            .await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_purchase"])
            .start_timer();

        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "INSERT INTO purchases (purchase_id, tenant_id, purchase_number, vendor_id, bill_date, \
             notes, subtotal, tax_total, round_off, grand_total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {}",
            PURCHASE_COLUMNS
        ))
        .bind(purchase_id)
        .bind(tenant_id)
        .bind(&purchase_number)
        .bind(payload.vendor_id)
        .bind(payload.bill_date)
        .bind(
            payload
                .notes
                .as_deref()
                .map(strip_markup)
                .filter(|n| !n.is_empty()),
        )
        .bind(totals.subtotal)
        .bind(totals.tax_total)
        .bind(totals.round_off)
        .bind(totals.grand_total)
        .fetch_one(&mut *tx)
        .await?;

        timer.observe_duration();

        if let Some(token) = token {
            if !idempotency::persist(&mut tx, tenant_id, token, EntityKind::Purchase, purchase_id)
                .await?
            {
                tx.rollback().await?;
                let mut conn = self.db.pool().acquire().await?;
                let existing = idempotency::check(&mut conn, tenant_id, token, EntityKind::Purchase)
                    .await?
                    .ok_or_else(|| {
                        CoreError::ConstraintViolation("request token already used".into())
                    })?;
                let row = load_purchase(&mut conn, tenant_id, existing).await?;
                return replayed(existing, row);
            }
        }

        ledger::recompute(&mut tx, tenant_id, payload.vendor_id, PartyType::Vendor).await?;

        tx.commit().await?;

        Ok((PurchaseView::from(&row), true))
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, purchase_id = %purchase_id))]
    pub async fn get_purchase(
        &self,
        ctx: &RequestContext,
        purchase_id: Uuid,
    ) -> Result<Option<PurchaseView>, CoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let row = load_purchase(&mut conn, ctx.tenant_id, purchase_id).await?;
        Ok(row.as_ref().map(PurchaseView::from))
    }

    /// Soft-delete a vendor bill and refresh the vendor's balance.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, purchase_id = %purchase_id))]
    pub async fn delete_purchase(
        &self,
        ctx: &RequestContext,
        purchase_id: Uuid,
    ) -> Result<(), CoreError> {
        let result: Result<Uuid, CoreError> = async {
            let mut tx = self.db.begin().await?;

            let vendor_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                UPDATE purchases SET deleted_utc = NOW()
                WHERE tenant_id = $1 AND purchase_id = $2 AND deleted_utc IS NULL
                RETURNING vendor_id
                "#,
            )
            .bind(ctx.tenant_id)
            .bind(purchase_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::AlreadyDeletedOrNotFound(format!("purchase {}", purchase_id)))?;

            ledger::recompute(&mut tx, ctx.tenant_id, vendor_id, PartyType::Vendor).await?;

            tx.commit().await?;
            Ok(vendor_id)
        }
        .await;
        record_outcome("delete_purchase", &result);

        let vendor_id = result?;
        info!(vendor_id = %vendor_id, "Purchase deleted");
        self.after_commit(
            ctx,
            EntityKind::Purchase.as_str(),
            purchase_id,
            AuditAction::Delete,
            serde_json::json!({ "vendorId": vendor_id }),
        );
        Ok(())
    }
}
