//! Vendor bill model for shop-service.

use crate::models::line_item::ItemInput;
use crate::services::money::format_minor;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseRow {
    pub purchase_id: Uuid,
    pub tenant_id: Uuid,
    pub purchase_number: String,
    pub vendor_id: Uuid,
    pub bill_date: NaiveDate,
    pub notes: Option<String>,
    pub subtotal: i64,
    pub tax_total: i64,
    pub round_off: i64,
    pub grand_total: i64,
    pub deleted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// A bill received from a vendor. Only its totals feed the vendor's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayload {
    pub vendor_id: Uuid,
    pub bill_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<ItemInput>,
    #[serde(default)]
    pub request_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseView {
    pub id: Uuid,
    pub purchase_number: String,
    pub vendor_id: Uuid,
    pub bill_date: NaiveDate,
    pub notes: Option<String>,
    pub subtotal: String,
    pub tax_total: String,
    pub round_off: String,
    pub grand_total: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PurchaseRow> for PurchaseView {
    fn from(row: &PurchaseRow) -> Self {
        Self {
            id: row.purchase_id,
            purchase_number: row.purchase_number.clone(),
            vendor_id: row.vendor_id,
            bill_date: row.bill_date,
            notes: row.notes.clone(),
            subtotal: format_minor(row.subtotal),
            tax_total: format_minor(row.tax_total),
            round_off: format_minor(row.round_off),
            grand_total: format_minor(row.grand_total),
            created_at: row.created_utc,
        }
    }
}
