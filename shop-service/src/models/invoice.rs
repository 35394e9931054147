//! Invoice model for shop-service.

use crate::models::line_item::{ItemInput, ItemRow, ItemView};
use crate::services::sequence::CounterKey;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceType {
    Invoice,
    Proforma,
    Lending,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Invoice => "INVOICE",
            InvoiceType::Proforma => "PROFORMA",
            InvoiceType::Lending => "LENDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INVOICE" => Some(InvoiceType::Invoice),
            "PROFORMA" => Some(InvoiceType::Proforma),
            "LENDING" => Some(InvoiceType::Lending),
            _ => None,
        }
    }

    /// Each type numbers from its own counter.
    pub fn counter_key(&self) -> CounterKey {
        match self {
            InvoiceType::Invoice => CounterKey::Invoice,
            InvoiceType::Proforma => CounterKey::Proforma,
            InvoiceType::Lending => CounterKey::Lending,
        }
    }
}

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Paid,
    /// Initial state, before any allocation has touched the invoice.
    Pending,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Pending => "PENDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(InvoiceStatus::Unpaid),
            "PARTIAL" => Some(InvoiceStatus::Partial),
            "PAID" => Some(InvoiceStatus::Paid),
            "PENDING" => Some(InvoiceStatus::Pending),
            _ => None,
        }
    }
}

/// Invoice header row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_number: String,
    pub invoice_type: String,
    pub status: String,
    pub customer_id: Option<Uuid>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub place_of_supply: Option<String>,
    pub notes: Option<String>,
    pub deleted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl InvoiceRow {
    pub fn parsed_status(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::parse(&self.status)
    }

    pub fn parsed_type(&self) -> Option<InvoiceType> {
        InvoiceType::parse(&self.invoice_type)
    }
}

/// Header values written by create and update. Timestamps are set by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderWrite {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_number: String,
    pub invoice_type: InvoiceType,
    pub status: InvoiceStatus,
    pub customer_id: Option<Uuid>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub place_of_supply: Option<String>,
    pub notes: Option<String>,
}

/// Customer details frozen onto an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SnapshotRow {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
}

/// Derived totals; integer columns are authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TotalsRow {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub subtotal: i64,
    pub tax_total: i64,
    pub cgst: i64,
    pub sgst: i64,
    pub igst: i64,
    pub round_off: i64,
    pub grand_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PhotoRow {
    pub photo_id: Uuid,
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub file_ref: String,
    pub checksum: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Every row an invoice owns, as read from the store.
#[derive(Debug, Clone)]
pub struct InvoiceRowSet {
    pub header: InvoiceRow,
    pub snapshot: Option<SnapshotRow>,
    pub items: Vec<ItemRow>,
    pub totals: Option<TotalsRow>,
    pub photos: Vec<PhotoRow>,
}

/// Rows produced by decomposing a payload, ready for insertion.
#[derive(Debug, Clone)]
pub struct InvoiceWrite {
    pub header: HeaderWrite,
    pub snapshot: SnapshotRow,
    pub items: Vec<ItemRow>,
    pub totals: TotalsRow,
}

/// Customer details for a walk-in sale with no customer record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Client-submitted invoice aggregate for create and full-replacement update.
///
/// Update replaces the whole item list: item ids are regenerated on every
/// update and clients must not rely on them staying stable. There are no
/// fields for ids, totals or tax amounts; those are always server-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub invoice_type: InvoiceType,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub place_of_supply: Option<String>,
    /// Live customer to bill; its current details become the snapshot.
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    /// Walk-in details, used when `customer_id` is absent.
    #[serde(default)]
    pub customer: Option<CustomerDetails>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemInput>,
    /// Caller-chosen token that deduplicates retried creates.
    #[serde(default)]
    pub request_token: Option<String>,
}

/// Customer block of the aggregate, read from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub id: Option<Uuid>,
    pub name: String,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    pub subtotal: String,
    pub tax_total: String,
    pub cgst: String,
    pub sgst: String,
    pub igst: String,
    pub round_off: String,
    pub grand_total: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoView {
    pub id: Uuid,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
}

/// The invoice as callers see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceAggregate {
    pub id: Uuid,
    pub invoice_number: String,
    pub invoice_type: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub place_of_supply: Option<String>,
    pub notes: Option<String>,
    /// Null when the invoice has no live customer reference.
    pub customer: Option<CustomerView>,
    /// Snapshot of who was billed, present for walk-in sales too.
    pub billed_to: Option<CustomerView>,
    pub items: Vec<ItemView>,
    pub totals: TotalsView,
    pub photos: Vec<PhotoView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Listing row: header plus the figures a list screen needs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceSummaryRow {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub invoice_type: String,
    pub status: String,
    pub customer_id: Option<Uuid>,
    pub billed_to: Option<String>,
    pub issue_date: NaiveDate,
    pub grand_total: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub id: Uuid,
    pub invoice_number: String,
    pub invoice_type: String,
    pub status: String,
    pub customer_id: Option<Uuid>,
    pub billed_to: Option<String>,
    pub issue_date: NaiveDate,
    pub grand_total: String,
}
