//! Services module for shop-service.

pub mod aggregate;
pub mod database;
pub mod hooks;
pub mod idempotency;
pub mod invoices;
pub mod ledger;
pub mod metrics;
pub mod money;
pub mod parties;
pub mod payments;
pub mod purchases;
pub mod sequence;
pub mod shop;
pub mod store;

pub use database::Database;
pub use hooks::{
    AlwaysIntraState, AuditAction, AuditEvent, AuditSink, Clock, FixedClock, MutationBroadcaster,
    MutationObserver, PlaceOfSupplyPolicy, SystemClock, TracingAuditSink,
};
pub use invoices::InvoicePage;
pub use metrics::{get_metrics, init_metrics};
pub use money::SupplyKind;
pub use sequence::CounterKey;
pub use shop::ShopService;
