//! Vendor bills and vendor balance integration tests.

mod common;

use chrono::{Datelike, NaiveDate, Utc};
use common::{dec, item, spawn_app};
use shop_service::error::CoreError;
use shop_service::models::{Direction, ItemInput, PartyType, PaymentPayload, PurchasePayload};
use uuid::Uuid;

fn bill(vendor_id: Uuid, items: Vec<ItemInput>) -> PurchasePayload {
    PurchasePayload {
        vendor_id,
        bill_date: NaiveDate::from_ymd_opt(2026, 4, 20).expect("valid date"),
        notes: Some("<i>Bullion</i> lot".to_string()),
        items,
        request_token: None,
    }
}

#[tokio::test]
async fn purchase_raises_vendor_balance() {
    let Some(app) = spawn_app().await else { return };
    let vendor = app.vendor("Mint Traders").await;

    let purchase = app
        .shop
        .create_purchase(
            &app.ctx,
            &bill(vendor.id, vec![item("Gold bar", "1", "5000.00", Some("3"))]),
        )
        .await
        .unwrap();

    assert_eq!(
        purchase.purchase_number,
        format!("PUR/{}/0001", Utc::now().year())
    );
    assert_eq!(purchase.subtotal, "5000.00");
    assert_eq!(purchase.tax_total, "150.00");
    assert_eq!(purchase.grand_total, "5150.00");
    assert_eq!(purchase.notes.as_deref(), Some("Bullion lot"));
    assert_eq!(app.balance(PartyType::Vendor, vendor.id).await, "5150.00");
}

#[tokio::test]
async fn outgoing_payment_reduces_vendor_balance() {
    let Some(app) = spawn_app().await else { return };
    let vendor = app.vendor("Silver House").await;
    app.shop
        .create_purchase(&app.ctx, &bill(vendor.id, vec![item("Silver", "2", "1000.00", None)]))
        .await
        .unwrap();

    let paid = app
        .shop
        .create_payment(
            &app.ctx,
            &PaymentPayload {
                direction: Direction::Out,
                party_type: PartyType::Vendor,
                party_id: vendor.id,
                amount: dec("1500.00"),
                payment_date: NaiveDate::from_ymd_opt(2026, 4, 25).expect("valid date"),
                mode: Some("NEFT".to_string()),
                notes: None,
                allocations: Vec::new(),
                request_token: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(paid.direction, "OUT");
    assert_eq!(app.balance(PartyType::Vendor, vendor.id).await, "500.00");

    app.shop.delete_payment(&app.ctx, paid.id).await.unwrap();
    assert_eq!(app.balance(PartyType::Vendor, vendor.id).await, "2000.00");
}

#[tokio::test]
async fn vendor_payment_cannot_allocate() {
    let Some(app) = spawn_app().await else { return };
    let vendor = app.vendor("Allocator").await;

    let err = app
        .shop
        .create_payment(
            &app.ctx,
            &PaymentPayload {
                direction: Direction::Out,
                party_type: PartyType::Vendor,
                party_id: vendor.id,
                amount: dec("10.00"),
                payment_date: NaiveDate::from_ymd_opt(2026, 4, 25).expect("valid date"),
                mode: None,
                notes: None,
                allocations: vec![shop_service::models::AllocationInput {
                    invoice_id: Uuid::new_v4(),
                    amount: dec("10.00"),
                }],
                request_token: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn deleting_purchase_restores_balance() {
    let Some(app) = spawn_app().await else { return };
    let vendor = app.vendor("Returns").await;
    let purchase = app
        .shop
        .create_purchase(&app.ctx, &bill(vendor.id, vec![item("Stones", "10", "25.00", None)]))
        .await
        .unwrap();
    assert_eq!(app.balance(PartyType::Vendor, vendor.id).await, "250.00");

    app.shop.delete_purchase(&app.ctx, purchase.id).await.unwrap();

    assert_eq!(app.balance(PartyType::Vendor, vendor.id).await, "0.00");
    assert!(app.shop.get_purchase(&app.ctx, purchase.id).await.unwrap().is_none());

    let err = app
        .shop
        .delete_purchase(&app.ctx, purchase.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyDeletedOrNotFound(_)));
}

#[tokio::test]
async fn repeated_request_token_records_one_purchase() {
    let Some(app) = spawn_app().await else { return };
    let vendor = app.vendor("Retry Vendor").await;

    let mut payload = bill(vendor.id, vec![item("Wire", "1", "99.99", None)]);
    payload.request_token = Some("bill-42".to_string());

    let first = app.shop.create_purchase(&app.ctx, &payload).await.unwrap();
    let second = app.shop.create_purchase(&app.ctx, &payload).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(app.count_rows("purchases").await, 1);
    assert_eq!(first.grand_total, "100.00");
    assert_eq!(app.balance(PartyType::Vendor, vendor.id).await, "100.00");
}

#[tokio::test]
async fn purchase_for_customer_id_is_not_found() {
    let Some(app) = spawn_app().await else { return };
    let customer = app.customer("Not a vendor").await;

    let err = app
        .shop
        .create_purchase(&app.ctx, &bill(customer.id, vec![item("x", "1", "1.00", None)]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}
