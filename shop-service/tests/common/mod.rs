//! Common test utilities for shop-service integration tests.
//!
//! Tests need a PostgreSQL database in `TEST_DATABASE_URL`; without it they
//! return early.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use shop_service::config::{DatabaseConfig, NumberingConfig, PhotoConfig, ShopConfig};
use shop_service::models::{
    CustomerDetails, InvoicePayload, InvoiceType, ItemInput, NewParty, PartyType, PartyView,
    RequestContext,
};
use shop_service::services::ShopService;
use shop_service::startup::Application;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const PHOTO_BASE_URL: &str = "https://files.shop.test";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,shop_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(database_url: String) -> ShopConfig {
    ShopConfig {
        common: CommonConfig {
            port: 0,
            environment: "test".to_string(),
        },
        service_name: "shop-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 10,
            min_connections: 1,
        },
        numbering: NumberingConfig::default(),
        photos: PhotoConfig {
            download_base_url: PHOTO_BASE_URL.to_string(),
        },
    }
}

/// Test application wrapper: one freshly provisioned tenant.
pub struct TestApp {
    pub shop: ShopService,
    pub ctx: RequestContext,
    pub tenant_id: Uuid,
    pub pool: PgPool,
    pub port: u16,
}

/// Build the application against the test database and provision a unique
/// tenant. `None` when no test database is configured.
pub async fn spawn_app() -> Option<TestApp> {
    init_tracing();

    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping database test");
        return None;
    };

    let app = Application::build(test_config(database_url))
        .await
        .expect("Failed to build application");

    let port = app.port();
    let shop = app.shop();
    let pool = app.db().pool().clone();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let tenant_id = Uuid::new_v4();
    shop.provision_tenant(tenant_id)
        .await
        .expect("Failed to provision tenant");

    Some(TestApp {
        shop,
        ctx: RequestContext::new(tenant_id, Uuid::new_v4(), "owner"),
        tenant_id,
        pool,
        port,
    })
}

impl TestApp {
    /// A second, separately provisioned tenant on the same database.
    pub async fn other_tenant(&self) -> RequestContext {
        let tenant_id = Uuid::new_v4();
        self.shop
            .provision_tenant(tenant_id)
            .await
            .expect("Failed to provision tenant");
        RequestContext::new(tenant_id, Uuid::new_v4(), "owner")
    }

    pub async fn customer(&self, name: &str) -> PartyView {
        self.shop
            .create_customer(
                &self.ctx,
                &NewParty {
                    name: name.to_string(),
                    phone: Some("98450 12345".to_string()),
                    ..NewParty::default()
                },
            )
            .await
            .expect("Failed to create customer")
    }

    pub async fn vendor(&self, name: &str) -> PartyView {
        self.shop
            .create_vendor(
                &self.ctx,
                &NewParty {
                    name: name.to_string(),
                    ..NewParty::default()
                },
            )
            .await
            .expect("Failed to create vendor")
    }

    pub async fn balance(&self, party_type: PartyType, party_id: Uuid) -> String {
        self.shop
            .get_party(&self.ctx, party_type, party_id)
            .await
            .expect("Failed to get party")
            .expect("Party not found")
            .balance
    }

    /// Balance recomputed from raw rows, independent of the service.
    pub async fn ledger_balance(&self, customer_id: Uuid) -> i64 {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT
                (SELECT COALESCE(SUM(t.grand_total), 0)::BIGINT
                 FROM invoices i JOIN invoice_totals t ON t.invoice_id = i.invoice_id
                 WHERE i.tenant_id = $1 AND i.customer_id = $2 AND i.deleted_utc IS NULL)
              - (SELECT COALESCE(SUM(amount), 0)::BIGINT
                 FROM payments WHERE tenant_id = $1 AND party_id = $2)
            "#,
        )
        .bind(self.tenant_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to compute ledger balance")
    }

    /// Stored integer balance of a customer.
    pub async fn stored_balance(&self, customer_id: Uuid) -> i64 {
        sqlx::query_scalar::<_, i64>(
            "SELECT balance FROM customers WHERE tenant_id = $1 AND customer_id = $2",
        )
        .bind(self.tenant_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to read balance")
    }

    /// Rows this tenant owns in `table`.
    pub async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {} WHERE tenant_id = $1",
            table
        ))
        .bind(self.tenant_id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to count rows")
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("valid decimal")
}

pub fn item(description: &str, quantity: &str, rate: &str, tax_rate: Option<&str>) -> ItemInput {
    ItemInput {
        description: description.to_string(),
        quantity: dec(quantity),
        rate: dec(rate),
        tax_rate: tax_rate.map(dec),
        weight: None,
        amount: None,
    }
}

/// An invoice for a live customer.
pub fn invoice_for(customer_id: Uuid, items: Vec<ItemInput>) -> InvoicePayload {
    InvoicePayload {
        invoice_type: InvoiceType::Invoice,
        issue_date: NaiveDate::from_ymd_opt(2026, 5, 2).expect("valid date"),
        due_date: None,
        place_of_supply: None,
        customer_id: Some(customer_id),
        customer: None,
        notes: None,
        items,
        request_token: None,
    }
}

/// An invoice for a walk-in customer with no record.
pub fn walk_in_invoice(name: &str, items: Vec<ItemInput>) -> InvoicePayload {
    InvoicePayload {
        customer_id: None,
        customer: Some(CustomerDetails {
            name: name.to_string(),
            ..CustomerDetails::default()
        }),
        ..invoice_for(Uuid::nil(), items)
    }
}

/// The reference sale: 2 × 500.00 at 3%.
pub fn reference_items() -> Vec<ItemInput> {
    vec![item("22K gold chain", "2", "500.00", Some("3"))]
}
