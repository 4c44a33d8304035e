#[path = "common/mod.rs"]
mod common;

use chrono::{Duration, Utc};
use mongodb::bson::{DateTime, Document, doc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use prezio::{
    error::AppError,
    models::{Currency, InvoiceStatus, ItemCategory, LineItem, MpesaChannel, PaymentDetails, PaymentStatus, TemplateKind},
    billing::receipt_number,
    state::{
        ClientInput, CreateInvoiceInput, ListQuery, PaymentInput, create_client, create_invoice,
        create_receipt, delete_client,
        delete_invoice, delete_receipt, get_invoice, get_receipt, list_deleted_invoices, list_invoices,
        list_receipts, purge_deleted_documents, restore_client, restore_invoice, restore_receipt,
    },
};

async fn open_invoice(state: &prezio::state::AppState, fx: &common::Fixture) -> prezio::models::Invoice {
    create_invoice(
        state,
        &fx.user,
        CreateInvoiceInput {
            client: fx.client_id(),
            template: fx.template_id(),
            name: "Retainer".into(),
            project_description: String::new(),
            notes: String::new(),
            currency: Currency::USD,
            due_date: "2031-03-01".into(),
            line_items: vec![LineItem {
                description: "Support".into(),
                quantity: dec!(1),
                unit_price: dec!(1000),
                category: ItemCategory::Service,
                other_name: None,
                discount: Decimal::ZERO,
            }],
            discount: dec!(160),
            payment: PaymentInput {
                details: PaymentDetails::Mpesa {
                    channel: MpesaChannel::SendMoney {
                        phone_number: "+254700000001".into(),
                        is_new_number: false,
                    },
                    transaction_id: None,
                },
            },
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn linked_receipt_updates_invoice_and_snapshots_balance() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = open_invoice(&state, &fx).await;
    let id = invoice.id.unwrap();

    let receipt = create_receipt(
        &state,
        &fx.user,
        json!({
            "invoice": id.to_hex(),
            "payment": {
                "amount_paid": 600,
                "details": { "method": "cash", "received_by": "Front desk" },
            },
            "notes": "Deposit",
        }),
    )
    .await
    .unwrap();

    assert!(receipt.receipt_number.starts_with("RCPT-"));
    assert_eq!(receipt.currency, Currency::USD);
    assert_eq!(receipt.client, fx.client.id.unwrap());
    assert_eq!(receipt.payment.status, PaymentStatus::Partial);
    let snapshot = receipt.invoice_snapshot.clone().unwrap();
    assert_eq!(snapshot.invoice_total, dec!(1000));
    assert_eq!(snapshot.previously_paid, Decimal::ZERO);
    assert_eq!(snapshot.balance_due, dec!(400));

    let updated = get_invoice(&state, &fx.user, &id).await.unwrap();
    assert_eq!(updated.payment.amount_paid, dec!(600));
    assert_eq!(updated.status, InvoiceStatus::Partial);
    assert_eq!(updated.version, 1);
    let entry = updated.payment_history.last().unwrap();
    assert_eq!(entry.receipt_number.as_deref(), Some(receipt.receipt_number.as_str()));

    // second receipt overpays: capped at the balance
    let second = create_receipt(
        &state,
        &fx.user,
        json!({
            "invoice": id.to_hex(),
            "payment": {
                "amount_paid": 500,
                "details": { "method": "cash", "received_by": "Front desk" },
            },
        }),
    )
    .await
    .unwrap();
    assert_eq!(second.payment.amount_paid, dec!(400));
    assert_eq!(second.invoice_snapshot.unwrap().previously_paid, dec!(600));
    let paid = get_invoice(&state, &fx.user, &id).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);

    let page = list_receipts(
        &state,
        &fx.user,
        &ListQuery {
            search: Some(invoice.invoice_number.clone()),
            ..ListQuery::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.total, 2);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn receipts_require_fields_and_reject_canceled_invoices() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Receipt).await;

    let err = create_receipt(&state, &fx.user, json!({ "client": fx.client_id() }))
        .await
        .unwrap_err();
    match err {
        AppError::MissingFields(fields) => {
            assert!(fields.contains(&"items".to_string()));
            assert!(fields.contains(&"payment.amount_paid".to_string()));
        }
        other => panic!("expected missing fields, got {other:?}"),
    }

    let standalone = create_receipt(
        &state,
        &fx.user,
        json!({
            "client": fx.client_id(),
            "template": fx.template_id(),
            "currency": "KSH",
            "items": [{ "description": "Consulting", "quantity": 2, "unit_price": 150 }],
            "payment": {
                "amount_paid": 348,
                "details": { "method": "bank", "bank_name": "Equity", "account_number": "0123" },
            },
        }),
    )
    .await
    .unwrap();
    assert!(standalone.invoice.is_none());
    assert_eq!(standalone.total, dec!(348));
    assert_eq!(standalone.payment.status, PaymentStatus::Paid);

    let invoice = open_invoice(&state, &fx).await;
    state
        .invoices
        .update_one(doc! { "_id": invoice.id }, doc! { "$set": { "status": "canceled" } })
        .await
        .unwrap();
    let err = create_receipt(
        &state,
        &fx.user,
        json!({
            "invoice": invoice.id.unwrap().to_hex(),
            "payment": {
                "amount_paid": 100,
                "details": { "method": "cash", "received_by": "Front desk" },
            },
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn soft_delete_restore_and_purge() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = open_invoice(&state, &fx).await;
    let id = invoice.id.unwrap();

    delete_invoice(&state, &fx.user, &id).await.unwrap();
    assert!(matches!(
        get_invoice(&state, &fx.user, &id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    let query = ListQuery::default();
    assert_eq!(list_invoices(&state, &fx.user, &query).await.unwrap().total, 0);
    assert_eq!(list_deleted_invoices(&state, &fx.user, &query).await.unwrap().total, 1);
    assert!(matches!(
        delete_invoice(&state, &fx.user, &id).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    let restored = restore_invoice(&state, &fx.user, &id).await.unwrap();
    assert!(!restored.is_deleted);
    assert!(restored.deleted_at.is_none());
    assert_eq!(list_invoices(&state, &fx.user, &query).await.unwrap().total, 1);

    // another owner cannot see or delete it
    let other = common::fixture(&state, TemplateKind::Invoice).await;
    assert!(matches!(
        delete_invoice(&state, &other.user, &id).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    let client_id = fx.client.id.unwrap();
    delete_client(&state, &fx.user, &client_id).await.unwrap();
    restore_client(&state, &fx.user, &client_id).await.unwrap();

    let receipt = create_receipt(
        &state,
        &fx.user,
        json!({
            "invoice": id.to_hex(),
            "payment": {
                "amount_paid": 100,
                "details": { "method": "cash", "received_by": "Front desk" },
            },
        }),
    )
    .await
    .unwrap();
    let receipt_id = receipt.id.unwrap();
    delete_receipt(&state, &fx.user, &receipt_id).await.unwrap();
    restore_receipt(&state, &fx.user, &receipt_id).await.unwrap();
    delete_receipt(&state, &fx.user, &receipt_id).await.unwrap();

    // backdate the trashed receipt past retention
    let old = DateTime::from_chrono(Utc::now() - Duration::days(45));
    state
        .receipts
        .update_one(doc! { "_id": receipt_id }, doc! { "$set": { "deleted_at": old } })
        .await
        .unwrap();
    let report = purge_deleted_documents(&state, 30).await.unwrap();
    assert_eq!(report.receipts, 1);
    assert_eq!(report.total(), 1);
    assert!(
        state
            .receipts
            .find_one(doc! { "_id": receipt_id })
            .await
            .unwrap()
            .is_none()
    );
    assert!(get_receipt(&state, &fx.user, &receipt_id).await.is_err());

    common::teardown(ctx).await;
}

#[tokio::test]
async fn sweep_pass_flags_overdue_invoices() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = open_invoice(&state, &fx).await;
    state
        .invoices
        .update_one(
            doc! { "_id": invoice.id },
            doc! { "$set": { "status": "pending", "due_date": DateTime::from_chrono(Utc::now() - Duration::days(2)) } },
        )
        .await
        .unwrap();

    prezio::jobs::run_sweeps(&state).await;

    let swept = get_invoice(&state, &fx.user, &invoice.id.unwrap()).await.unwrap();
    assert_eq!(swept.status, InvoiceStatus::Overdue);
    assert_eq!(swept.payment.status, PaymentStatus::Overdue);

    common::teardown(ctx).await;
}

fn consulting_receipt(fx: &common::Fixture) -> serde_json::Value {
    json!({
        "client": fx.client_id(),
        "template": fx.template_id(),
        "currency": "KSH",
        "items": [{ "description": "Consulting", "quantity": 1, "unit_price": 100 }],
        "payment": {
            "amount_paid": 116,
            "details": { "method": "cash", "received_by": "Front desk" },
        },
    })
}

/// Occupy `RCPT-<this month>-<counter>` for the fixture user.
async fn take_receipt_number(state: &prezio::state::AppState, fx: &common::Fixture, counter: i64) {
    state
        .receipts
        .clone_with_type::<Document>()
        .insert_one(doc! {
            "creator": fx.user,
            "receipt_number": receipt_number(counter, Utc::now()),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn taken_receipt_number_is_retried_once() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Receipt).await;
    take_receipt_number(&state, &fx, 1).await;

    let receipt = create_receipt(&state, &fx.user, consulting_receipt(&fx)).await.unwrap();
    assert_eq!(receipt.receipt_number, receipt_number(2, Utc::now()));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn second_collision_surfaces_as_duplicate() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Receipt).await;
    take_receipt_number(&state, &fx, 1).await;
    take_receipt_number(&state, &fx, 2).await;

    let err = create_receipt(&state, &fx.user, consulting_receipt(&fx)).await.unwrap_err();
    assert!(matches!(err, AppError::Duplicate(_)));
    assert_eq!(
        state.receipts.count_documents(doc! { "items": { "$exists": true } }).await.unwrap(),
        0
    );

    // the counter moved past both taken numbers
    let receipt = create_receipt(&state, &fx.user, consulting_receipt(&fx)).await.unwrap();
    assert_eq!(receipt.receipt_number, receipt_number(3, Utc::now()));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn linked_receipt_keeps_the_invoice_client() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = open_invoice(&state, &fx).await;
    let other = create_client(
        &state,
        &fx.user,
        ClientInput {
            name: "Globex".into(),
            address: "Kenyatta Avenue 4".into(),
            contact_name: "Hank Scorpio".into(),
            contact_phone: "0711 222 333".into(),
            contact_email: "hank@globex.test".into(),
        },
    )
    .await
    .unwrap();

    let err = create_receipt(
        &state,
        &fx.user,
        json!({
            "invoice": invoice.id.unwrap().to_hex(),
            "client": other.id.unwrap().to_hex(),
            "payment": {
                "amount_paid": 100,
                "details": { "method": "cash", "received_by": "Front desk" },
            },
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let untouched = get_invoice(&state, &fx.user, &invoice.id.unwrap()).await.unwrap();
    assert_eq!(untouched.version, 0);
    assert_eq!(state.receipts.count_documents(doc! {}).await.unwrap(), 0);

    let receipt = create_receipt(
        &state,
        &fx.user,
        json!({
            "invoice": invoice.id.unwrap().to_hex(),
            "client": fx.client_id(),
            "payment": {
                "amount_paid": 100,
                "details": { "method": "cash", "received_by": "Front desk" },
            },
        }),
    )
    .await
    .unwrap();
    assert_eq!(receipt.client_snapshot.name, "Acme Ltd");

    common::teardown(ctx).await;
}
