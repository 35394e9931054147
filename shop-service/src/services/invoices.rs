//! Invoice create, update, delete and read.
//!
//! Each write is one transaction spanning the header, snapshot, items,
//! totals, idempotency mapping and the customer balance.

use crate::error::CoreError;
use crate::models::{
    CustomerDetails, InvoiceAggregate, InvoicePayload, InvoiceRow, InvoiceStatus, InvoiceSummary,
    ListInvoicesFilter, PartyType, PhotoView, RequestContext,
};
use crate::services::aggregate::{self, photo_download_url};
use crate::services::database::Tx;
use crate::services::hooks::{invoice_details, AuditAction};
use crate::services::idempotency::{self, EntityKind};
use crate::services::ledger;
use crate::services::metrics::{record_outcome, IDEMPOTENT_REPLAYS_TOTAL};
use crate::services::money::{compute, Computation};
use crate::services::parties::require_party;
use crate::services::payments::recompute_invoice_status;
use crate::services::shop::ShopService;
use crate::services::store;
use std::collections::BTreeSet;
use tracing::{info, instrument};
use uuid::Uuid;

/// One page of invoice summaries.
#[derive(Debug, Clone)]
pub struct InvoicePage {
    pub invoices: Vec<InvoiceSummary>,
    /// Pass back as `page_token` for the next page; `None` on the last page.
    pub next_page_token: Option<Uuid>,
}

impl ShopService {
    fn totals_for(&self, ctx: &RequestContext, payload: &InvoicePayload) -> Result<Computation, CoreError> {
        let supply = self
            .supply_policy
            .supply_kind(ctx.tenant_id, payload.place_of_supply.as_deref());
        compute(&aggregate::taxable_lines(&payload.items), supply)
    }

    /// Who the invoice is billed to: the live customer's current details, or
    /// the walk-in details from the payload.
    async fn billed_to(
        &self,
        tx: &mut Tx,
        ctx: &RequestContext,
        payload: &InvoicePayload,
    ) -> Result<CustomerDetails, CoreError> {
        match payload.customer_id {
            Some(customer_id) => {
                let customer =
                    require_party(tx, ctx.tenant_id, PartyType::Customer, customer_id).await?;
                Ok(CustomerDetails {
                    name: customer.name,
                    phone: customer.phone,
                    tax_id: customer.tax_id,
                    address: customer.address,
                })
            }
            None => payload.customer.clone().ok_or_else(|| {
                CoreError::Validation("customer details are required without a customer id".into())
            }),
        }
    }

    async fn assemble_in(
        &self,
        tx: &mut Tx,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceAggregate>, CoreError> {
        let rows = store::load_invoice(tx, tenant_id, invoice_id).await?;
        Ok(rows.map(|r| aggregate::assemble(r, &self.photo_base_url)))
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Create an invoice. A repeated request token returns the invoice the
    /// first request created. Once that invoice has been deleted the token
    /// stays claimed and a replay fails with [`CoreError::NotFound`].
    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id, invoice_type = payload.invoice_type.as_str()))]
    pub async fn create_invoice(
        &self,
        ctx: &RequestContext,
        payload: &InvoicePayload,
    ) -> Result<InvoiceAggregate, CoreError> {
        let result = self.create_invoice_tx(ctx, payload).await;
        record_outcome("create_invoice", &result);

        let (aggregate, created) = result?;
        if created {
            info!(
                invoice_id = %aggregate.id,
                invoice_number = %aggregate.invoice_number,
                grand_total = %aggregate.totals.grand_total,
                "Invoice created"
            );
            self.after_commit(
                ctx,
                EntityKind::Invoice.as_str(),
                aggregate.id,
                AuditAction::Create,
                serde_json::json!({
                    "invoiceNumber": aggregate.invoice_number,
                    "grandTotal": aggregate.totals.grand_total,
                }),
            );
        }
        Ok(aggregate)
    }

    async fn create_invoice_tx(
        &self,
        ctx: &RequestContext,
        payload: &InvoicePayload,
    ) -> Result<(InvoiceAggregate, bool), CoreError> {
        let tenant_id = ctx.tenant_id;
        let token = idempotency::normalize(payload.request_token.as_deref());

        let mut tx = self.db.begin().await?;

        if let Some(token) = token {
            if let Some(existing) =
                idempotency::check(&mut tx, tenant_id, token, EntityKind::Invoice).await?
            {
                let aggregate = self.assemble_in(&mut tx, tenant_id, existing).await?;
                tx.rollback().await?;
                return replayed(existing, aggregate);
            }
        }

        let computation = self.totals_for(ctx, payload)?;
        let billed_to = self.billed_to(&mut tx, ctx, payload).await?;

        let invoice_id = Uuid::new_v4();
        let invoice_number = self
            .next_number(&mut tx, tenant_id, payload.invoice_type.counter_key())
            .await?;

        let write = aggregate::decompose(
            tenant_id,
            invoice_id,
            invoice_number,
            InvoiceStatus::Pending,
            payload,
            &billed_to,
            &computation,
        )?;
        store::insert_invoice(&mut tx, &write).await?;

        if let Some(token) = token {
            if !idempotency::persist(&mut tx, tenant_id, token, EntityKind::Invoice, invoice_id)
                .await?
            {
                tx.rollback().await?;
                return self.replay_invoice_after_race(tenant_id, token).await;
            }
        }

        if let Some(customer_id) = payload.customer_id {
            ledger::recompute(&mut tx, tenant_id, customer_id, PartyType::Customer).await?;
        }

        let aggregate = self
            .assemble_in(&mut tx, tenant_id, invoice_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))?;

        tx.commit().await?;

        Ok((aggregate, true))
    }

    async fn replay_invoice_after_race(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> Result<(InvoiceAggregate, bool), CoreError> {
        let mut tx = self.db.begin_read().await?;
        let existing = idempotency::check(&mut tx, tenant_id, token, EntityKind::Invoice)
            .await?
            .ok_or_else(|| CoreError::ConstraintViolation("request token already used".into()))?;
        let aggregate = self.assemble_in(&mut tx, tenant_id, existing).await?;
        tx.commit().await?;
        replayed(existing, aggregate)
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Replace an invoice's contents. Number, type and payment status are
    /// kept; the item list is replaced wholesale and item ids change.
    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        payload: &InvoicePayload,
    ) -> Result<InvoiceAggregate, CoreError> {
        let result = self.update_invoice_tx(ctx, invoice_id, payload).await;
        record_outcome("update_invoice", &result);

        let (aggregate, previous) = result?;
        info!(
            invoice_number = %aggregate.invoice_number,
            grand_total = %aggregate.totals.grand_total,
            "Invoice updated"
        );
        self.after_commit(
            ctx,
            EntityKind::Invoice.as_str(),
            invoice_id,
            AuditAction::Update,
            serde_json::json!({
                "before": invoice_details(&previous),
                "grandTotal": aggregate.totals.grand_total,
            }),
        );
        Ok(aggregate)
    }

    async fn update_invoice_tx(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        payload: &InvoicePayload,
    ) -> Result<(InvoiceAggregate, InvoiceRow), CoreError> {
        let tenant_id = ctx.tenant_id;
        let mut tx = self.db.begin().await?;

        let existing = store::lock_invoice(&mut tx, tenant_id, invoice_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))?;

        if existing.parsed_type() != Some(payload.invoice_type) {
            return Err(CoreError::Validation(format!(
                "invoice type cannot change from {}",
                existing.invoice_type
            )));
        }
        let status = existing.parsed_status().ok_or_else(|| {
            CoreError::Database(anyhow::anyhow!(
                "invoice {} has unknown status '{}'",
                invoice_id,
                existing.status
            ))
        })?;

        let computation = self.totals_for(ctx, payload)?;
        let billed_to = self.billed_to(&mut tx, ctx, payload).await?;

        let write = aggregate::decompose(
            tenant_id,
            invoice_id,
            existing.invoice_number.clone(),
            status,
            payload,
            &billed_to,
            &computation,
        )?;

        store::update_header(&mut tx, &write.header).await?;
        store::delete_children(&mut tx, tenant_id, invoice_id).await?;
        store::insert_children(&mut tx, &write).await?;

        if status != InvoiceStatus::Pending {
            recompute_invoice_status(&mut tx, tenant_id, invoice_id).await?;
        }

        let customers: BTreeSet<Uuid> = existing
            .customer_id
            .into_iter()
            .chain(payload.customer_id)
            .collect();
        for customer_id in customers {
            ledger::recompute(&mut tx, tenant_id, customer_id, PartyType::Customer).await?;
        }

        let aggregate = self
            .assemble_in(&mut tx, tenant_id, invoice_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))?;

        tx.commit().await?;

        Ok((aggregate, existing))
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Soft-delete an invoice. Its rows stay in place; it stops counting
    /// toward the customer's balance.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, ctx: &RequestContext, invoice_id: Uuid) -> Result<(), CoreError> {
        let result: Result<Option<Uuid>, CoreError> = async {
            let mut tx = self.db.begin().await?;

            let customer_id = store::soft_delete(&mut tx, ctx.tenant_id, invoice_id)
                .await?
                .ok_or_else(|| CoreError::AlreadyDeletedOrNotFound(format!("invoice {}", invoice_id)))?;

            if let Some(customer_id) = customer_id {
                ledger::recompute(&mut tx, ctx.tenant_id, customer_id, PartyType::Customer).await?;
            }

            tx.commit().await?;
            Ok(customer_id)
        }
        .await;
        record_outcome("delete_invoice", &result);

        let customer_id = result?;
        info!("Invoice deleted");
        self.after_commit(
            ctx,
            EntityKind::Invoice.as_str(),
            invoice_id,
            AuditAction::Delete,
            serde_json::json!({ "customerId": customer_id }),
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// The assembled invoice, or `None` if it is deleted or belongs to
    /// another tenant.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceAggregate>, CoreError> {
        let mut tx = self.db.begin_read().await?;
        let aggregate = self.assemble_in(&mut tx, ctx.tenant_id, invoice_id).await?;
        tx.commit().await?;
        Ok(aggregate)
    }

    #[instrument(skip(self, ctx, filter), fields(tenant_id = %ctx.tenant_id))]
    pub async fn list_invoices(
        &self,
        ctx: &RequestContext,
        filter: &ListInvoicesFilter,
    ) -> Result<InvoicePage, CoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let rows = store::list_invoices(&mut conn, ctx.tenant_id, filter).await?;

        let limit = filter.page_size.clamp(1, 100) as usize;
        let next_page_token = if rows.len() == limit {
            rows.last().map(|r| r.invoice_id)
        } else {
            None
        };

        Ok(InvoicePage {
            invoices: rows.into_iter().map(aggregate::summarize).collect(),
            next_page_token,
        })
    }

    // -------------------------------------------------------------------------
    // Photos
    // -------------------------------------------------------------------------

    /// Record a stored photo against a live invoice.
    #[instrument(skip(self, ctx, checksum), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id))]
    pub async fn attach_photo(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        file_ref: &str,
        checksum: Option<&str>,
    ) -> Result<PhotoView, CoreError> {
        let result: Result<PhotoView, CoreError> = async {
            let file_ref = file_ref.trim();
            if file_ref.is_empty() {
                return Err(CoreError::Validation("file reference is required".into()));
            }

            let mut tx = self.db.begin().await?;
            store::lock_invoice(&mut tx, ctx.tenant_id, invoice_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))?;
            let photo =
                store::insert_photo(&mut tx, ctx.tenant_id, invoice_id, file_ref, checksum).await?;
            tx.commit().await?;

            Ok(PhotoView {
                id: photo.photo_id,
                download_url: photo_download_url(&self.photo_base_url, invoice_id, photo.photo_id),
                created_at: photo.created_utc,
            })
        }
        .await;
        record_outcome("attach_photo", &result);

        let photo = result?;
        info!(photo_id = %photo.id, "Photo attached");
        self.after_commit(
            ctx,
            EntityKind::Invoice.as_str(),
            invoice_id,
            AuditAction::Update,
            serde_json::json!({ "photoAdded": photo.id }),
        );
        Ok(photo)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id, photo_id = %photo_id))]
    pub async fn remove_photo(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        photo_id: Uuid,
    ) -> Result<(), CoreError> {
        let result: Result<(), CoreError> = async {
            let mut tx = self.db.begin().await?;
            store::lock_invoice(&mut tx, ctx.tenant_id, invoice_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))?;
            if !store::delete_photo(&mut tx, ctx.tenant_id, invoice_id, photo_id).await? {
                return Err(CoreError::NotFound(format!("photo {}", photo_id)));
            }
            tx.commit().await?;
            Ok(())
        }
        .await;
        record_outcome("remove_photo", &result);

        result?;
        info!("Photo removed");
        self.after_commit(
            ctx,
            EntityKind::Invoice.as_str(),
            invoice_id,
            AuditAction::Update,
            serde_json::json!({ "photoRemoved": photo_id }),
        );
        Ok(())
    }
}

fn replayed(
    invoice_id: Uuid,
    aggregate: Option<InvoiceAggregate>,
) -> Result<(InvoiceAggregate, bool), CoreError> {
    IDEMPOTENT_REPLAYS_TOTAL
        .with_label_values(&[EntityKind::Invoice.as_str()])
        .inc();
    info!(invoice_id = %invoice_id, "Replaying idempotent invoice create");
    aggregate
        .map(|a| (a, false))
        .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))
}
