//! Payment allocation and balance integration tests.

mod common;

use chrono::NaiveDate;
use common::{dec, invoice_for, item, reference_items, spawn_app, TestApp};
use shop_service::error::CoreError;
use shop_service::models::{
    AllocationInput, Direction, InvoiceAggregate, PartyType, PaymentPayload,
};
use uuid::Uuid;

fn payment(customer_id: Uuid, amount: &str, allocations: &[(Uuid, &str)]) -> PaymentPayload {
    PaymentPayload {
        direction: Direction::In,
        party_type: PartyType::Customer,
        party_id: customer_id,
        amount: dec(amount),
        payment_date: NaiveDate::from_ymd_opt(2026, 5, 3).expect("valid date"),
        mode: Some("UPI".to_string()),
        notes: None,
        allocations: allocations
            .iter()
            .map(|(invoice_id, amount)| AllocationInput {
                invoice_id: *invoice_id,
                amount: dec(amount),
            })
            .collect(),
        request_token: None,
    }
}

async fn reference_invoice(app: &TestApp, customer_id: Uuid) -> InvoiceAggregate {
    app.shop
        .create_invoice(&app.ctx, &invoice_for(customer_id, reference_items()))
        .await
        .unwrap()
}

async fn status_of(app: &TestApp, invoice_id: Uuid) -> String {
    app.shop
        .get_invoice(&app.ctx, invoice_id)
        .await
        .unwrap()
        .unwrap()
        .status
}

async fn assert_balanced(app: &TestApp, customer_id: Uuid) {
    assert_eq!(
        app.ledger_balance(customer_id).await,
        app.stored_balance(customer_id).await
    );
}

#[tokio::test]
async fn full_payment_settles_invoice() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Full Pay").await;
    let invoice = reference_invoice(&app, customer.id).await;

    let paid = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "1030.00", &[(invoice.id, "1030.00")]))
        .await
        .unwrap();

    assert_eq!(paid.amount, "1030.00");
    assert_eq!(paid.direction, "IN");
    assert!(paid.transaction_number.starts_with("PAY/"));
    assert_eq!(paid.allocations.len(), 1);
    assert_eq!(paid.allocations[0].amount, "1030.00");

    assert_eq!(status_of(&app, invoice.id).await, "PAID");
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "0.00");
    assert_balanced(&app, customer.id).await;
}

#[tokio::test]
async fn partial_payments_then_deletes_walk_status_back() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Stepwise").await;
    let invoice = reference_invoice(&app, customer.id).await;

    let first = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "500.00", &[(invoice.id, "500.00")]))
        .await
        .unwrap();
    assert_eq!(status_of(&app, invoice.id).await, "PARTIAL");
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "530.00");
    assert_balanced(&app, customer.id).await;

    let second = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "530.00", &[(invoice.id, "530.00")]))
        .await
        .unwrap();
    assert_eq!(status_of(&app, invoice.id).await, "PAID");
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "0.00");
    assert_balanced(&app, customer.id).await;

    app.shop.delete_payment(&app.ctx, second.id).await.unwrap();
    assert_eq!(status_of(&app, invoice.id).await, "PARTIAL");
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "530.00");
    assert_balanced(&app, customer.id).await;

    app.shop.delete_payment(&app.ctx, first.id).await.unwrap();
    assert_eq!(status_of(&app, invoice.id).await, "UNPAID");
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "1030.00");
    assert_balanced(&app, customer.id).await;
    assert_eq!(app.count_rows("payment_allocations").await, 0);
}

#[tokio::test]
async fn unallocated_payment_counts_toward_balance() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Advance").await;
    let invoice = reference_invoice(&app, customer.id).await;

    app.shop
        .create_payment(&app.ctx, &payment(customer.id, "1000.00", &[(invoice.id, "400.00")]))
        .await
        .unwrap();

    assert_eq!(status_of(&app, invoice.id).await, "PARTIAL");
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "30.00");
    assert_balanced(&app, customer.id).await;
}

#[tokio::test]
async fn one_payment_spans_several_invoices() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Spread").await;
    let a = reference_invoice(&app, customer.id).await;
    let b = app
        .shop
        .create_invoice(
            &app.ctx,
            &invoice_for(customer.id, vec![item("Polish", "1", "200.00", None)]),
        )
        .await
        .unwrap();

    let paid = app
        .shop
        .create_payment(
            &app.ctx,
            &payment(customer.id, "1100.00", &[(a.id, "900.00"), (b.id, "200.00")]),
        )
        .await
        .unwrap();

    assert_eq!(paid.allocations.len(), 2);
    assert_eq!(status_of(&app, a.id).await, "PARTIAL");
    assert_eq!(status_of(&app, b.id).await, "PAID");
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "130.00");
    assert_balanced(&app, customer.id).await;
}

#[tokio::test]
async fn over_allocation_is_rejected() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Greedy").await;
    let invoice = reference_invoice(&app, customer.id).await;

    let err = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "100.00", &[(invoice.id, "100.01")]))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(app.count_rows("payments").await, 0);
    assert_eq!(status_of(&app, invoice.id).await, "PENDING");
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Zero").await;

    let err = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "0", &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn allocation_to_another_customers_invoice_is_rejected() {
    let Some(app) = spawn_app().await else { return };
    let owner = app.customer("Owner").await;
    let stranger = app.customer("Stranger").await;
    let invoice = reference_invoice(&app, owner.id).await;

    let err = app
        .shop
        .create_payment(&app.ctx, &payment(stranger.id, "100.00", &[(invoice.id, "100.00")]))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(app.stored_balance(stranger.id).await, 0);
    assert_eq!(app.stored_balance(owner.id).await, 103_000);
}

#[tokio::test]
async fn allocation_to_deleted_invoice_is_not_found() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Late").await;
    let invoice = reference_invoice(&app, customer.id).await;
    app.shop.delete_invoice(&app.ctx, invoice.id).await.unwrap();

    let err = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "100.00", &[(invoice.id, "100.00")]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn deleting_missing_payment_is_not_found() {
    let Some(app) = spawn_app().await else { return };

    let err = app
        .shop
        .delete_payment(&app.ctx, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn repeated_request_token_records_one_payment() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Retry").await;
    let invoice = reference_invoice(&app, customer.id).await;

    let mut payload = payment(customer.id, "300.00", &[(invoice.id, "300.00")]);
    payload.request_token = Some("pay-once".to_string());

    let first = app.shop.create_payment(&app.ctx, &payload).await.unwrap();
    let second = app.shop.create_payment(&app.ctx, &payload).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(app.count_rows("payments").await, 1);
    assert_eq!(app.balance(PartyType::Customer, customer.id).await, "730.00");
}

#[tokio::test]
async fn token_used_for_invoice_cannot_create_payment() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Mixed").await;

    let mut invoice = invoice_for(customer.id, reference_items());
    invoice.request_token = Some("shared-token".to_string());
    app.shop.create_invoice(&app.ctx, &invoice).await.unwrap();

    let mut pay = payment(customer.id, "10.00", &[]);
    pay.request_token = Some("shared-token".to_string());
    let err = app.shop.create_payment(&app.ctx, &pay).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn list_and_get_payments_for_party() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("History").await;
    let invoice = reference_invoice(&app, customer.id).await;

    let a = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "100.00", &[(invoice.id, "100.00")]))
        .await
        .unwrap();
    let b = app
        .shop
        .create_payment(&app.ctx, &payment(customer.id, "50.00", &[]))
        .await
        .unwrap();

    let listed = app
        .shop
        .list_payments(&app.ctx, PartyType::Customer, customer.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    let ids: Vec<Uuid> = listed.iter().map(|p| p.id).collect();
    assert!(ids.contains(&a.id) && ids.contains(&b.id));

    let fetched = app.shop.get_payment(&app.ctx, a.id).await.unwrap().unwrap();
    assert_eq!(fetched, a);

    let other = app.other_tenant().await;
    assert!(app.shop.get_payment(&other, a.id).await.unwrap().is_none());
}

#[tokio::test]
async fn recompute_balance_repairs_drift() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Drift").await;
    reference_invoice(&app, customer.id).await;

    sqlx::query("UPDATE customers SET balance = 1, balance_display = '0.01' WHERE tenant_id = $1 AND customer_id = $2")
        .bind(app.tenant_id)
        .bind(customer.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let party = app
        .shop
        .recompute_balance(&app.ctx, PartyType::Customer, customer.id)
        .await
        .unwrap();
    assert_eq!(party.balance, "1030.00");
    assert_balanced(&app, customer.id).await;
}
