//! Payment model for shop-service.

use crate::models::party::PartyType;
use crate::services::money::format_minor;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Money flow direction relative to the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment row; `amount` in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub transaction_number: String,
    pub direction: String,
    pub party_type: String,
    pub party_id: Uuid,
    pub amount: i64,
    pub payment_date: NaiveDate,
    pub mode: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl PaymentRow {
    pub fn parsed_party_type(&self) -> Option<PartyType> {
        PartyType::parse(&self.party_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AllocationRow {
    pub allocation_id: Uuid,
    pub tenant_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationInput {
    pub invoice_id: Uuid,
    pub amount: Decimal,
}

/// Client-submitted payment. Allocations may cover less than the amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub direction: Direction,
    pub party_type: PartyType,
    pub party_id: Uuid,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub allocations: Vec<AllocationInput>,
    #[serde(default)]
    pub request_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationView {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: String,
}

impl From<&AllocationRow> for AllocationView {
    fn from(row: &AllocationRow) -> Self {
        Self {
            id: row.allocation_id,
            invoice_id: row.invoice_id,
            amount: format_minor(row.amount),
        }
    }
}

/// Payment with its allocations, as callers see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: Uuid,
    pub transaction_number: String,
    pub direction: String,
    pub party_type: String,
    pub party_id: Uuid,
    pub amount: String,
    pub payment_date: NaiveDate,
    pub mode: Option<String>,
    pub notes: Option<String>,
    pub allocations: Vec<AllocationView>,
    pub created_at: DateTime<Utc>,
}

impl PaymentView {
    pub fn from_rows(payment: &PaymentRow, allocations: &[AllocationRow]) -> Self {
        Self {
            id: payment.payment_id,
            transaction_number: payment.transaction_number.clone(),
            direction: payment.direction.clone(),
            party_type: payment.party_type.clone(),
            party_id: payment.party_id,
            amount: format_minor(payment.amount),
            payment_date: payment.payment_date,
            mode: payment.mode.clone(),
            notes: payment.notes.clone(),
            allocations: allocations
                .iter()
                .filter(|a| a.payment_id == payment.payment_id)
                .map(AllocationView::from)
                .collect(),
            created_at: payment.created_utc,
        }
    }
}
