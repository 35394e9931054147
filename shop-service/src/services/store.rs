//! Row-level SQL for invoices and their child tables.
//!
//! Every function runs on the caller's connection so it joins the caller's
//! transaction. All queries filter on `tenant_id`.

use crate::error::CoreError;
use crate::models::{
    HeaderWrite, InvoiceRow, InvoiceRowSet, InvoiceStatus, InvoiceSummaryRow, InvoiceWrite,
    ItemRow, ListInvoicesFilter, PhotoRow, SnapshotRow, TotalsRow,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::money::format_minor;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, tenant_id, invoice_number, invoice_type, status, \
    customer_id, issue_date, due_date, place_of_supply, notes, deleted_utc, created_utc, updated_utc";

// -------------------------------------------------------------------------
// Writes
// -------------------------------------------------------------------------

/// Insert a new invoice with all of its child rows.
#[instrument(skip(conn, write), fields(tenant_id = %write.header.tenant_id, invoice_id = %write.header.invoice_id))]
pub async fn insert_invoice(conn: &mut PgConnection, write: &InvoiceWrite) -> Result<(), CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["insert_invoice"])
        .start_timer();

    let h = &write.header;
    sqlx::query(
        r#"
        INSERT INTO invoices (invoice_id, tenant_id, invoice_number, invoice_type, status,
                              customer_id, issue_date, due_date, place_of_supply, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(h.invoice_id)
    .bind(h.tenant_id)
    .bind(&h.invoice_number)
    .bind(h.invoice_type.as_str())
    .bind(h.status.as_str())
    .bind(h.customer_id)
    .bind(h.issue_date)
    .bind(h.due_date)
    .bind(&h.place_of_supply)
    .bind(&h.notes)
    .execute(&mut *conn)
    .await?;

    timer.observe_duration();

    insert_children(conn, write).await
}

/// Rewrite the mutable header fields of a live invoice. Number and type are
/// left as they are.
#[instrument(skip(conn, header), fields(tenant_id = %header.tenant_id, invoice_id = %header.invoice_id))]
pub async fn update_header(conn: &mut PgConnection, header: &HeaderWrite) -> Result<(), CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["update_invoice_header"])
        .start_timer();

    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET customer_id = $3, issue_date = $4, due_date = $5, place_of_supply = $6,
            notes = $7, updated_utc = NOW()
        WHERE tenant_id = $1 AND invoice_id = $2 AND deleted_utc IS NULL
        "#,
    )
    .bind(header.tenant_id)
    .bind(header.invoice_id)
    .bind(header.customer_id)
    .bind(header.issue_date)
    .bind(header.due_date)
    .bind(&header.place_of_supply)
    .bind(&header.notes)
    .execute(&mut *conn)
    .await?;

    timer.observe_duration();

    if result.rows_affected() == 0 {
        return Err(CoreError::NotFound(format!("invoice {}", header.invoice_id)));
    }
    Ok(())
}

/// Remove snapshot, items and totals so they can be re-inserted.
pub async fn delete_children(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<(), CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["delete_invoice_children"])
        .start_timer();

    for table in ["invoice_customer_snapshots", "invoice_items", "invoice_totals"] {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE tenant_id = $1 AND invoice_id = $2",
            table
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;
    }

    timer.observe_duration();
    Ok(())
}

/// Insert snapshot, items and totals.
pub async fn insert_children(conn: &mut PgConnection, write: &InvoiceWrite) -> Result<(), CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["insert_invoice_children"])
        .start_timer();

    let s = &write.snapshot;
    sqlx::query(
        r#"
        INSERT INTO invoice_customer_snapshots (invoice_id, tenant_id, name, phone, tax_id, address)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(s.invoice_id)
    .bind(s.tenant_id)
    .bind(&s.name)
    .bind(&s.phone)
    .bind(&s.tax_id)
    .bind(&s.address)
    .execute(&mut *conn)
    .await?;

    for item in &write.items {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (item_id, invoice_id, tenant_id, position, description,
                                       quantity, rate, tax_rate, weight, amount,
                                       line_subtotal, line_tax)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(item.item_id)
        .bind(item.invoice_id)
        .bind(item.tenant_id)
        .bind(item.position)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.rate)
        .bind(item.tax_rate)
        .bind(&item.weight)
        .bind(&item.amount)
        .bind(item.line_subtotal)
        .bind(item.line_tax)
        .execute(&mut *conn)
        .await?;
    }

    let t = &write.totals;
    sqlx::query(
        r#"
        INSERT INTO invoice_totals (invoice_id, tenant_id, subtotal, tax_total, cgst, sgst, igst,
                                    round_off, grand_total, subtotal_display, tax_total_display,
                                    cgst_display, sgst_display, igst_display, round_off_display,
                                    grand_total_display)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(t.invoice_id)
    .bind(t.tenant_id)
    .bind(t.subtotal)
    .bind(t.tax_total)
    .bind(t.cgst)
    .bind(t.sgst)
    .bind(t.igst)
    .bind(t.round_off)
    .bind(t.grand_total)
    .bind(format_minor(t.subtotal))
    .bind(format_minor(t.tax_total))
    .bind(format_minor(t.cgst))
    .bind(format_minor(t.sgst))
    .bind(format_minor(t.igst))
    .bind(format_minor(t.round_off))
    .bind(format_minor(t.grand_total))
    .execute(&mut *conn)
    .await?;

    timer.observe_duration();
    Ok(())
}

pub async fn set_status(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
    status: InvoiceStatus,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE invoices SET status = $3, updated_utc = NOW()
        WHERE tenant_id = $1 AND invoice_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .bind(status.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Soft-delete a live invoice. `None` when it was already deleted or never
/// existed; otherwise the customer it was billed to.
#[instrument(skip(conn), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
pub async fn soft_delete(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<Option<Uuid>>, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["soft_delete_invoice"])
        .start_timer();

    let customer_id = sqlx::query_scalar::<_, Option<Uuid>>(
        r#"
        UPDATE invoices SET deleted_utc = NOW(), updated_utc = NOW()
        WHERE tenant_id = $1 AND invoice_id = $2 AND deleted_utc IS NULL
        RETURNING customer_id
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;

    timer.observe_duration();
    Ok(customer_id)
}

// -------------------------------------------------------------------------
// Photos
// -------------------------------------------------------------------------

pub async fn insert_photo(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
    file_ref: &str,
    checksum: Option<&str>,
) -> Result<PhotoRow, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["insert_photo"])
        .start_timer();

    let photo = sqlx::query_as::<_, PhotoRow>(
        r#"
        INSERT INTO invoice_photos (photo_id, invoice_id, tenant_id, file_ref, checksum)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING photo_id, invoice_id, tenant_id, file_ref, checksum, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(invoice_id)
    .bind(tenant_id)
    .bind(file_ref)
    .bind(checksum)
    .fetch_one(&mut *conn)
    .await?;

    timer.observe_duration();
    Ok(photo)
}

/// Returns `false` when no such photo belongs to the invoice.
pub async fn delete_photo(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
    photo_id: Uuid,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        DELETE FROM invoice_photos
        WHERE tenant_id = $1 AND invoice_id = $2 AND photo_id = $3
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .bind(photo_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

// -------------------------------------------------------------------------
// Reads
// -------------------------------------------------------------------------

/// Lock a live invoice header for the rest of the transaction.
pub async fn lock_invoice(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<InvoiceRow>, CoreError> {
    let row = sqlx::query_as::<_, InvoiceRow>(&format!(
        "SELECT {} FROM invoices \
         WHERE tenant_id = $1 AND invoice_id = $2 AND deleted_utc IS NULL \
         FOR UPDATE",
        INVOICE_COLUMNS
    ))
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Read every row a live invoice owns.
#[instrument(skip(conn), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
pub async fn load_invoice(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<InvoiceRowSet>, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["load_invoice"])
        .start_timer();

    let header = sqlx::query_as::<_, InvoiceRow>(&format!(
        "SELECT {} FROM invoices \
         WHERE tenant_id = $1 AND invoice_id = $2 AND deleted_utc IS NULL",
        INVOICE_COLUMNS
    ))
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(header) = header else {
        timer.observe_duration();
        return Ok(None);
    };

    let snapshot = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT invoice_id, tenant_id, name, phone, tax_id, address
        FROM invoice_customer_snapshots
        WHERE tenant_id = $1 AND invoice_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;

    let items = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT item_id, invoice_id, tenant_id, position, description, quantity, rate, tax_rate,
               weight, amount, line_subtotal, line_tax
        FROM invoice_items
        WHERE tenant_id = $1 AND invoice_id = $2
        ORDER BY position
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    let totals = sqlx::query_as::<_, TotalsRow>(
        r#"
        SELECT invoice_id, tenant_id, subtotal, tax_total, cgst, sgst, igst, round_off, grand_total
        FROM invoice_totals
        WHERE tenant_id = $1 AND invoice_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?;

    let photos = sqlx::query_as::<_, PhotoRow>(
        r#"
        SELECT photo_id, invoice_id, tenant_id, file_ref, checksum, created_utc
        FROM invoice_photos
        WHERE tenant_id = $1 AND invoice_id = $2
        ORDER BY created_utc, photo_id
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    timer.observe_duration();

    Ok(Some(InvoiceRowSet {
        header,
        snapshot,
        items,
        totals,
        photos,
    }))
}

/// One page of live invoices in id order, starting after `page_token`.
#[instrument(skip(conn, filter), fields(tenant_id = %tenant_id))]
pub async fn list_invoices(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    filter: &ListInvoicesFilter,
) -> Result<Vec<InvoiceSummaryRow>, CoreError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["list_invoices"])
        .start_timer();

    let limit = filter.page_size.clamp(1, 100) as i64;

    let rows = sqlx::query_as::<_, InvoiceSummaryRow>(
        r#"
        SELECT i.invoice_id, i.invoice_number, i.invoice_type, i.status, i.customer_id,
               s.name AS billed_to, i.issue_date, t.grand_total
        FROM invoices i
        LEFT JOIN invoice_customer_snapshots s ON s.invoice_id = i.invoice_id
        LEFT JOIN invoice_totals t ON t.invoice_id = i.invoice_id
        WHERE i.tenant_id = $1
          AND i.deleted_utc IS NULL
          AND ($2::varchar IS NULL OR i.status = $2)
          AND ($3::uuid IS NULL OR i.customer_id = $3)
          AND ($4::uuid IS NULL OR i.invoice_id > $4)
        ORDER BY i.invoice_id
        LIMIT $5
        "#,
    )
    .bind(tenant_id)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.customer_id)
    .bind(filter.page_token)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    timer.observe_duration();
    Ok(rows)
}
