//! Collaborator seams: audit recording, post-commit change notification,
//! place-of-supply policy and the clock that dates document numbers.

use crate::models::InvoiceRow;
use crate::services::money::SupplyKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

/// One committed mutation, as handed to the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub tenant_id: Uuid,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub details: serde_json::Value,
    pub actor_user_id: Uuid,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()>;
}

/// Writes audit events to the log stream.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()> {
        info!(
            target: "audit",
            tenant_id = %event.tenant_id,
            entity_type = event.entity_type,
            entity_id = %event.entity_id,
            action = event.action.as_str(),
            actor_user_id = %event.actor_user_id,
            details = %event.details,
            "Audit event"
        );
        Ok(())
    }
}

/// Notified after a tenant's data changed and committed.
pub trait MutationObserver: Send + Sync {
    fn on_mutation(&self, tenant_id: Uuid);
}

/// Fans mutation notices out to any number of subscribers, e.g. a cache that
/// drops a tenant's entries.
#[derive(Debug, Clone)]
pub struct MutationBroadcaster {
    sender: broadcast::Sender<Uuid>,
}

impl MutationBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.sender.subscribe()
    }
}

impl Default for MutationBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MutationObserver for MutationBroadcaster {
    fn on_mutation(&self, tenant_id: Uuid) {
        // No receivers is not an error.
        let _ = self.sender.send(tenant_id);
    }
}

/// Decides whether an invoice is an intra- or inter-state supply.
pub trait PlaceOfSupplyPolicy: Send + Sync {
    fn supply_kind(&self, tenant_id: Uuid, place_of_supply: Option<&str>) -> SupplyKind;
}

/// Treats every sale as intra-state.
#[derive(Debug, Default, Clone)]
pub struct AlwaysIntraState;

impl PlaceOfSupplyPolicy for AlwaysIntraState {
    fn supply_kind(&self, _tenant_id: Uuid, _place_of_supply: Option<&str>) -> SupplyKind {
        SupplyKind::IntraState
    }
}

/// Source of the current time for document numbering.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock UTC.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Compact audit details for an invoice header.
pub fn invoice_details(row: &InvoiceRow) -> serde_json::Value {
    serde_json::json!({
        "invoiceNumber": row.invoice_number,
        "invoiceType": row.invoice_type,
        "status": row.status,
        "customerId": row.customer_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_intra_state() {
        let policy = AlwaysIntraState;
        assert_eq!(
            policy.supply_kind(Uuid::new_v4(), Some("Karnataka")),
            SupplyKind::IntraState
        );
    }

    #[test]
    fn fixed_clock_does_not_advance() {
        use chrono::TimeZone;
        let instant = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let clock = FixedClock(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), instant);
    }

    #[tokio::test]
    async fn broadcaster_delivers_tenant_to_subscribers() {
        let broadcaster = MutationBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        let tenant_id = Uuid::new_v4();

        broadcaster.on_mutation(tenant_id);

        assert_eq!(rx.recv().await.unwrap(), tenant_id);
    }

    #[test]
    fn broadcaster_without_subscribers_is_silent() {
        MutationBroadcaster::default().on_mutation(Uuid::new_v4());
    }

    #[tokio::test]
    async fn tracing_sink_accepts_events() {
        let event = AuditEvent {
            tenant_id: Uuid::new_v4(),
            entity_type: "invoice",
            entity_id: Uuid::new_v4(),
            action: AuditAction::Create,
            details: serde_json::json!({}),
            actor_user_id: Uuid::new_v4(),
        };
        assert!(TracingAuditSink.record(event).await.is_ok());
    }
}
