//! Line item model for shop-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item row. `rate`, `line_subtotal` and `line_tax` are minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ItemRow {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub position: i32,
    pub description: String,
    pub quantity: Decimal,
    pub rate: i64,
    pub tax_rate: Option<Decimal>,
    pub weight: Option<serde_json::Value>,
    pub amount: Option<serde_json::Value>,
    pub line_subtotal: i64,
    pub line_tax: i64,
}

/// Client-submitted line item. `rate` is a decimal currency amount and
/// `tax_rate` a percentage; `weight` and `amount` are opaque side-data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    #[serde(default)]
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub weight: Option<serde_json::Value>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: Uuid,
    pub description: String,
    pub quantity: String,
    pub rate: String,
    pub tax_rate: Option<String>,
    pub weight: Option<serde_json::Value>,
    pub amount: Option<serde_json::Value>,
    pub subtotal: String,
    pub tax: String,
}
