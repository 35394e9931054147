//! Mapping between the invoice aggregate and its normalized rows.
//!
//! Pure functions only; the store reads and writes the rows.

use crate::error::CoreError;
use crate::models::{
    CustomerDetails, CustomerView, HeaderWrite, InvoiceAggregate, InvoicePayload, InvoiceRowSet,
    InvoiceStatus, InvoiceSummary, InvoiceSummaryRow, InvoiceWrite, ItemInput, ItemRow, ItemView,
    PhotoRow, PhotoView, SnapshotRow, TotalsRow, TotalsView,
};
use crate::services::money::{format_minor, Computation, TaxableLine};
use service_core::utils::strip_markup;
use uuid::Uuid;

/// Public download location of a stored photo.
pub fn photo_download_url(base_url: &str, invoice_id: Uuid, photo_id: Uuid) -> String {
    format!(
        "{}/invoices/{}/photos/{}",
        base_url.trim_end_matches('/'),
        invoice_id,
        photo_id
    )
}

/// Build the caller-facing aggregate from stored rows.
pub fn assemble(rows: InvoiceRowSet, photo_base_url: &str) -> InvoiceAggregate {
    let InvoiceRowSet {
        header,
        snapshot,
        mut items,
        totals,
        photos,
    } = rows;

    items.sort_by_key(|item| item.position);

    let billed_to = snapshot.map(|s| CustomerView {
        id: header.customer_id,
        name: s.name,
        phone: s.phone,
        tax_id: s.tax_id,
        address: s.address,
    });
    let customer = match header.customer_id {
        Some(_) => billed_to.clone(),
        None => None,
    };

    let photos = photos
        .iter()
        .map(|p| photo_view(p, photo_base_url))
        .collect();

    InvoiceAggregate {
        id: header.invoice_id,
        invoice_number: header.invoice_number,
        invoice_type: header.invoice_type,
        status: header.status,
        issue_date: header.issue_date,
        due_date: header.due_date,
        place_of_supply: header.place_of_supply,
        notes: header.notes,
        customer,
        billed_to,
        items: items.iter().map(item_view).collect(),
        totals: totals_view(totals.as_ref()),
        photos,
        created_at: header.created_utc,
        updated_at: header.updated_utc,
    }
}

fn item_view(item: &ItemRow) -> ItemView {
    ItemView {
        id: item.item_id,
        description: item.description.clone(),
        quantity: item.quantity.normalize().to_string(),
        rate: format_minor(item.rate),
        tax_rate: item.tax_rate.map(|r| r.normalize().to_string()),
        weight: item.weight.clone(),
        amount: item.amount.clone(),
        subtotal: format_minor(item.line_subtotal),
        tax: format_minor(item.line_tax),
    }
}

fn totals_view(totals: Option<&TotalsRow>) -> TotalsView {
    let (subtotal, tax_total, cgst, sgst, igst, round_off, grand_total) = match totals {
        Some(t) => (
            t.subtotal,
            t.tax_total,
            t.cgst,
            t.sgst,
            t.igst,
            t.round_off,
            t.grand_total,
        ),
        None => (0, 0, 0, 0, 0, 0, 0),
    };
    TotalsView {
        subtotal: format_minor(subtotal),
        tax_total: format_minor(tax_total),
        cgst: format_minor(cgst),
        sgst: format_minor(sgst),
        igst: format_minor(igst),
        round_off: format_minor(round_off),
        grand_total: format_minor(grand_total),
    }
}

fn photo_view(photo: &PhotoRow, base_url: &str) -> PhotoView {
    PhotoView {
        id: photo.photo_id,
        download_url: photo_download_url(base_url, photo.invoice_id, photo.photo_id),
        created_at: photo.created_utc,
    }
}

pub fn summarize(row: InvoiceSummaryRow) -> InvoiceSummary {
    InvoiceSummary {
        id: row.invoice_id,
        invoice_number: row.invoice_number,
        invoice_type: row.invoice_type,
        status: row.status,
        customer_id: row.customer_id,
        billed_to: row.billed_to,
        issue_date: row.issue_date,
        grand_total: format_minor(row.grand_total.unwrap_or(0)),
    }
}

/// Calculator view of submitted items.
pub fn taxable_lines(items: &[ItemInput]) -> Vec<TaxableLine> {
    items
        .iter()
        .map(|item| TaxableLine {
            quantity: item.quantity,
            rate: item.rate,
            tax_rate: item.tax_rate,
        })
        .collect()
}

fn clean(value: &str) -> String {
    strip_markup(value)
}

fn clean_opt(value: Option<&str>) -> Option<String> {
    value.map(clean).filter(|v| !v.is_empty())
}

/// Sanitized copy of customer details. A name is required.
pub fn clean_customer(details: &CustomerDetails) -> Result<CustomerDetails, CoreError> {
    let name = clean(&details.name);
    if name.is_empty() {
        return Err(CoreError::Validation("customer name is required".into()));
    }
    Ok(CustomerDetails {
        name,
        phone: clean_opt(details.phone.as_deref()),
        tax_id: clean_opt(details.tax_id.as_deref()),
        address: clean_opt(details.address.as_deref()),
    })
}

/// Split a payload into the rows it is stored as.
///
/// Totals and per-line amounts come only from `computation`; the payload has
/// no field that can reach them.
pub fn decompose(
    tenant_id: Uuid,
    invoice_id: Uuid,
    invoice_number: String,
    status: InvoiceStatus,
    payload: &InvoicePayload,
    billed_to: &CustomerDetails,
    computation: &Computation,
) -> Result<InvoiceWrite, CoreError> {
    if computation.lines.len() != payload.items.len() {
        return Err(CoreError::Validation(
            "computed lines do not match submitted items".into(),
        ));
    }

    let billed_to = clean_customer(billed_to)?;

    let header = HeaderWrite {
        invoice_id,
        tenant_id,
        invoice_number,
        invoice_type: payload.invoice_type,
        status,
        customer_id: payload.customer_id,
        issue_date: payload.issue_date,
        due_date: payload.due_date,
        place_of_supply: clean_opt(payload.place_of_supply.as_deref()),
        notes: clean_opt(payload.notes.as_deref()),
    };

    let snapshot = SnapshotRow {
        invoice_id,
        tenant_id,
        name: billed_to.name,
        phone: billed_to.phone,
        tax_id: billed_to.tax_id,
        address: billed_to.address,
    };

    let items = payload
        .items
        .iter()
        .zip(&computation.lines)
        .enumerate()
        .map(|(position, (input, amounts))| ItemRow {
            item_id: Uuid::new_v4(),
            invoice_id,
            tenant_id,
            position: position as i32,
            description: clean(&input.description),
            quantity: input.quantity,
            rate: amounts.rate,
            tax_rate: input.tax_rate,
            weight: input.weight.clone(),
            amount: input.amount.clone(),
            line_subtotal: amounts.subtotal,
            line_tax: amounts.tax,
        })
        .collect();

    let t = &computation.totals;
    let totals = TotalsRow {
        invoice_id,
        tenant_id,
        subtotal: t.subtotal,
        tax_total: t.tax_total,
        cgst: t.cgst,
        sgst: t.sgst,
        igst: t.igst,
        round_off: t.round_off,
        grand_total: t.grand_total,
    };

    Ok(InvoiceWrite {
        header,
        snapshot,
        items,
        totals,
    })
}
