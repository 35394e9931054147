//! Customers and vendors.

use crate::error::CoreError;
use crate::models::{NewParty, PartyRow, PartyType, PartyView, RequestContext};
use crate::services::hooks::AuditAction;
use crate::services::metrics::{record_outcome, DB_QUERY_DURATION};
use crate::services::shop::ShopService;
use service_core::utils::strip_markup;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

fn select_party_sql(party_type: PartyType) -> String {
    format!(
        "SELECT {id} AS party_id, tenant_id, name, phone, tax_id, address, balance, \
         balance_display, created_utc, updated_utc \
         FROM {table} WHERE tenant_id = $1 AND {id} = $2",
        id = party_type.id_column(),
        table = party_type.table(),
    )
}

/// Read a party on the caller's connection.
pub async fn load_party(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    party_type: PartyType,
    party_id: Uuid,
) -> Result<Option<PartyRow>, CoreError> {
    let row = sqlx::query_as::<_, PartyRow>(&select_party_sql(party_type))
        .bind(tenant_id)
        .bind(party_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Like `load_party`, but a missing party is an error.
pub async fn require_party(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    party_type: PartyType,
    party_id: Uuid,
) -> Result<PartyRow, CoreError> {
    load_party(conn, tenant_id, party_type, party_id)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound(format!(
                "{} {}",
                party_type.as_str().to_lowercase(),
                party_id
            ))
        })
}

fn clean_opt(value: Option<&str>) -> Option<String> {
    value.map(strip_markup).filter(|v| !v.is_empty())
}

impl ShopService {
    pub async fn create_customer(
        &self,
        ctx: &RequestContext,
        input: &NewParty,
    ) -> Result<PartyView, CoreError> {
        self.create_party(ctx, PartyType::Customer, input).await
    }

    pub async fn create_vendor(
        &self,
        ctx: &RequestContext,
        input: &NewParty,
    ) -> Result<PartyView, CoreError> {
        self.create_party(ctx, PartyType::Vendor, input).await
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, party_type = %party_type))]
    async fn create_party(
        &self,
        ctx: &RequestContext,
        party_type: PartyType,
        input: &NewParty,
    ) -> Result<PartyView, CoreError> {
        let result: Result<PartyRow, CoreError> = async {
            let name = strip_markup(&input.name);
            if name.is_empty() {
                return Err(CoreError::Validation("name is required".into()));
            }

            let timer = DB_QUERY_DURATION
                .with_label_values(&["create_party"])
                .start_timer();

            let row = sqlx::query_as::<_, PartyRow>(&format!(
                "INSERT INTO {table} ({id}, tenant_id, name, phone, tax_id, address) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING {id} AS party_id, tenant_id, name, phone, tax_id, address, balance, \
                 balance_display, created_utc, updated_utc",
                id = party_type.id_column(),
                table = party_type.table(),
            ))
            .bind(Uuid::new_v4())
            .bind(ctx.tenant_id)
            .bind(&name)
            .bind(clean_opt(input.phone.as_deref()))
            .bind(clean_opt(input.tax_id.as_deref()))
            .bind(clean_opt(input.address.as_deref()))
            .fetch_one(self.db.pool())
            .await?;

            timer.observe_duration();
            Ok(row)
        }
        .await;

        record_outcome("create_party", &result);
        let row = result?;

        info!(party_id = %row.party_id, "Party created");

        self.after_commit(
            ctx,
            party_type_entity(party_type),
            row.party_id,
            AuditAction::Create,
            serde_json::json!({ "name": row.name }),
        );

        Ok(PartyView::from_row(party_type, row))
    }

    /// Fetch a customer or vendor with its current balance.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, party_id = %party_id))]
    pub async fn get_party(
        &self,
        ctx: &RequestContext,
        party_type: PartyType,
        party_id: Uuid,
    ) -> Result<Option<PartyView>, CoreError> {
        let mut conn = self.db.pool().acquire().await?;
        let row = load_party(&mut conn, ctx.tenant_id, party_type, party_id).await?;
        Ok(row.map(|r| PartyView::from_row(party_type, r)))
    }
}

fn party_type_entity(party_type: PartyType) -> &'static str {
    match party_type {
        PartyType::Customer => "customer",
        PartyType::Vendor => "vendor",
    }
}
