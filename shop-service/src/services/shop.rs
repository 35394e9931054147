//! The shop core's entry point.
//!
//! `ShopService` owns the pool and the collaborator hooks. Its operations are
//! spread over `invoices`, `payments`, `parties` and `purchases`; each one
//! runs in a single transaction and notifies collaborators only after commit.

use crate::config::{NumberingConfig, ShopConfig};
use crate::error::CoreError;
use crate::models::RequestContext;
use crate::services::database::Database;
use crate::services::hooks::{
    AlwaysIntraState, AuditAction, AuditEvent, AuditSink, Clock, MutationObserver,
    PlaceOfSupplyPolicy, SystemClock, TracingAuditSink,
};
use crate::services::sequence::{self, CounterKey};
use chrono::Datelike;
use sqlx::PgConnection;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct ShopService {
    pub(crate) db: Arc<Database>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) observer: Option<Arc<dyn MutationObserver>>,
    pub(crate) supply_policy: Arc<dyn PlaceOfSupplyPolicy>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) numbering: NumberingConfig,
    pub(crate) photo_base_url: String,
}

impl ShopService {
    pub fn new(db: Arc<Database>, numbering: NumberingConfig, photo_base_url: impl Into<String>) -> Self {
        Self {
            db,
            audit: Arc::new(TracingAuditSink),
            observer: None,
            supply_policy: Arc::new(AlwaysIntraState),
            clock: Arc::new(SystemClock),
            numbering,
            photo_base_url: photo_base_url.into(),
        }
    }

    pub fn from_config(db: Arc<Database>, config: &ShopConfig) -> Self {
        Self::new(
            db,
            config.numbering.clone(),
            config.photos.download_base_url.clone(),
        )
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn MutationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_supply_policy(mut self, policy: Arc<dyn PlaceOfSupplyPolicy>) -> Self {
        self.supply_policy = policy;
        self
    }

    /// Replace the clock whose UTC year is stamped into document numbers.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Seed a new tenant's counters.
    pub async fn provision_tenant(&self, tenant_id: Uuid) -> Result<(), CoreError> {
        self.db.provision_tenant(tenant_id).await
    }

    pub(crate) async fn next_number(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        key: CounterKey,
    ) -> Result<String, CoreError> {
        sequence::next_document_number(
            conn,
            tenant_id,
            key,
            self.numbering.prefix_for(key),
            self.numbering.width,
            self.clock.now().year(),
        )
        .await
    }

    /// Hand a committed mutation to the audit sink and the observer.
    /// Neither can fail the operation.
    pub(crate) fn after_commit(
        &self,
        ctx: &RequestContext,
        entity_type: &'static str,
        entity_id: Uuid,
        action: AuditAction,
        details: serde_json::Value,
    ) {
        let event = AuditEvent {
            tenant_id: ctx.tenant_id,
            entity_type,
            entity_id,
            action,
            details,
            actor_user_id: ctx.actor_user_id,
        };
        let audit = self.audit.clone();
        tokio::spawn(async move {
            if let Err(e) = audit.record(event).await {
                warn!(
                    error = %e,
                    entity_type = entity_type,
                    entity_id = %entity_id,
                    "Failed to record audit event"
                );
            }
        });

        if let Some(observer) = &self.observer {
            observer.on_mutation(ctx.tenant_id);
        }
    }
}
