//! Customer and vendor model for shop-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which side of the shop a party sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyType {
    Customer,
    Vendor,
}

impl PartyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyType::Customer => "CUSTOMER",
            PartyType::Vendor => "VENDOR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CUSTOMER" => Some(PartyType::Customer),
            "VENDOR" => Some(PartyType::Vendor),
            _ => None,
        }
    }

    /// Table holding parties of this type.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            PartyType::Customer => "customers",
            PartyType::Vendor => "vendors",
        }
    }

    pub(crate) fn id_column(&self) -> &'static str {
        match self {
            PartyType::Customer => "customer_id",
            PartyType::Vendor => "vendor_id",
        }
    }
}

impl std::fmt::Display for PartyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Customer or vendor row; the id column is aliased to `party_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PartyRow {
    pub party_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub balance: i64,
    pub balance_display: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a customer or vendor. Balance is never accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParty {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyView {
    pub id: Uuid,
    pub party_type: PartyType,
    pub name: String,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    /// Outstanding balance derived from the ledger.
    pub balance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PartyView {
    pub fn from_row(party_type: PartyType, row: PartyRow) -> Self {
        Self {
            id: row.party_id,
            party_type,
            name: row.name,
            phone: row.phone,
            tax_id: row.tax_id,
            address: row.address,
            balance: row.balance_display,
            created_at: row.created_utc,
            updated_at: row.updated_utc,
        }
    }
}
