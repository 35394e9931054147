//! A failure late in an invoice write must leave no trace.

mod common;

use common::{reference_items, spawn_app, walk_in_invoice, TestApp};
use serial_test::serial;
use shop_service::error::CoreError;
use shop_service::services::CounterKey;

async fn invoice_counter(app: &TestApp) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT value FROM sequences WHERE tenant_id = $1 AND counter_key = $2",
    )
    .bind(app.tenant_id)
    .bind(CounterKey::Invoice.as_str())
    .fetch_one(&app.pool)
    .await
    .unwrap()
}

/// Make every insert into `invoice_totals` fail for this tenant only.
async fn break_totals_insert(app: &TestApp) -> String {
    let suffix = app.tenant_id.simple().to_string();
    let function = format!("fail_totals_{}", suffix);

    sqlx::query(&format!(
        "CREATE FUNCTION {}() RETURNS trigger AS $$ \
         BEGIN RAISE EXCEPTION 'totals write refused'; END; \
         $$ LANGUAGE plpgsql",
        function
    ))
    .execute(&app.pool)
    .await
    .unwrap();

    sqlx::query(&format!(
        "CREATE TRIGGER {f} BEFORE INSERT ON invoice_totals \
         FOR EACH ROW WHEN (NEW.tenant_id = '{tenant}'::uuid) EXECUTE FUNCTION {f}()",
        f = function,
        tenant = app.tenant_id
    ))
    .execute(&app.pool)
    .await
    .unwrap();

    function
}

async fn restore_totals_insert(app: &TestApp, function: &str) {
    sqlx::query(&format!("DROP TRIGGER IF EXISTS {f} ON invoice_totals", f = function))
        .execute(&app.pool)
        .await
        .unwrap();
    sqlx::query(&format!("DROP FUNCTION IF EXISTS {}()", function))
        .execute(&app.pool)
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
async fn failed_totals_write_rolls_back_whole_invoice() {
    let Some(app) = spawn_app().await else { return };
    let before = invoice_counter(&app).await;

    let function = break_totals_insert(&app).await;

    let mut payload = walk_in_invoice("Rollback", reference_items());
    payload.request_token = Some("atomic-1".to_string());
    let result = app.shop.create_invoice(&app.ctx, &payload).await;

    restore_totals_insert(&app, &function).await;

    assert!(matches!(result, Err(CoreError::Database(_))), "{:?}", result);
    for table in [
        "invoices",
        "invoice_customer_snapshots",
        "invoice_items",
        "invoice_totals",
        "idempotency_keys",
    ] {
        assert_eq!(app.count_rows(table).await, 0, "{} has rows", table);
    }
    assert_eq!(invoice_counter(&app).await, before);

    // The same token works once the fault is gone.
    let invoice = app.shop.create_invoice(&app.ctx, &payload).await.unwrap();
    assert!(invoice.invoice_number.ends_with("/0001"));
    assert_eq!(app.count_rows("invoices").await, 1);
}
