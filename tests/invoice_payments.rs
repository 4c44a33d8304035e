#[path = "common/mod.rs"]
mod common;

use mongodb::bson::doc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use prezio::{
    error::AppError,
    models::{
        Currency, Invoice, InvoiceStatus, ItemCategory, LineItem, MpesaChannel, PaymentDetails,
        PaymentStatus, TemplateKind,
    },
    state::{
        CreateInvoiceInput, PaymentInput, PaymentUpdate, check_overdue_invoices, create_invoice,
        edit_invoice, get_invoice, get_invoice_payment_history, list_overdue_invoices,
        receipts_for_invoice, update_invoice_payment_status,
    },
};

fn line(description: &str, quantity: Decimal, unit_price: Decimal) -> LineItem {
    LineItem {
        description: description.into(),
        quantity,
        unit_price,
        category: ItemCategory::Service,
        other_name: None,
        discount: Decimal::ZERO,
    }
}

fn paybill() -> PaymentDetails {
    PaymentDetails::Mpesa {
        channel: MpesaChannel::Paybill {
            till_number: "522533".into(),
        },
        transaction_id: None,
    }
}

/// 1000 + 16% VAT - 160 discount = 1000 even.
async fn invoice_of_1000(state: &prezio::state::AppState, fx: &common::Fixture, due_date: &str) -> Invoice {
    create_invoice(
        state,
        &fx.user,
        CreateInvoiceInput {
            client: fx.client_id(),
            template: fx.template_id(),
            name: "Website build".into(),
            project_description: String::new(),
            notes: String::new(),
            currency: Currency::KSH,
            due_date: due_date.into(),
            line_items: vec![line("Build", dec!(1), dec!(1000))],
            discount: dec!(160),
            payment: PaymentInput { details: paybill() },
        },
    )
    .await
    .unwrap()
}

fn pay(version: i64, amount: Decimal) -> PaymentUpdate {
    PaymentUpdate {
        version,
        status: None,
        amount: Some(amount),
        details: None,
        notes: None,
        date_paid: None,
    }
}

#[tokio::test]
async fn payments_accumulate_and_cap_at_total() {
    let Some(ctx) = common::setup_state_with(|c| c.auto_receipts = false).await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = invoice_of_1000(&state, &fx, "2031-06-30").await;
    let id = invoice.id.unwrap();
    assert_eq!(invoice.invoice_number, "00001");
    assert_eq!(invoice.total, dec!(1000));
    assert_eq!(invoice.version, 0);

    let first = update_invoice_payment_status(&state, &fx.user, &id, pay(0, dec!(400)))
        .await
        .unwrap();
    assert_eq!(first.invoice.status, InvoiceStatus::Partial);
    assert_eq!(first.invoice.payment.amount_paid, dec!(400));
    assert_eq!(first.invoice.version, 1);

    let second = update_invoice_payment_status(&state, &fx.user, &id, pay(1, dec!(400)))
        .await
        .unwrap();
    assert_eq!(second.invoice.payment.amount_paid, dec!(800));
    assert_eq!(second.invoice.payment.status, PaymentStatus::Partial);

    let third = update_invoice_payment_status(&state, &fx.user, &id, pay(2, dec!(300)))
        .await
        .unwrap();
    let applied = third.applied.unwrap();
    assert_eq!(applied.applied, dec!(200));
    assert_eq!(applied.overpayment, dec!(100));
    assert_eq!(third.invoice.payment.amount_paid, dec!(1000));
    assert_eq!(third.invoice.status, InvoiceStatus::Paid);
    assert!(third.receipt.is_none());

    let history = get_invoice_payment_history(&state, &fx.user, &id).await.unwrap();
    assert_eq!(history.history.len(), 3);
    assert_eq!(history.current_status, InvoiceStatus::Paid);
    let amounts: Vec<Decimal> = third.invoice.payment_history.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![dec!(400), dec!(400), dec!(200)]);
    let last = third.invoice.payment_history.last().unwrap();
    assert_eq!(last.previous_amount, dec!(800));
    assert!(last.notes.as_deref().unwrap().contains("Overpayment"));

    let err = update_invoice_payment_status(&state, &fx.user, &id, pay(3, dec!(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ImmutableState(_)));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn stale_version_is_rejected_without_writing() {
    let Some(ctx) = common::setup_state_with(|c| c.auto_receipts = false).await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = invoice_of_1000(&state, &fx, "2031-06-30").await;
    let id = invoice.id.unwrap();

    update_invoice_payment_status(&state, &fx.user, &id, pay(0, dec!(400)))
        .await
        .unwrap();
    let err = update_invoice_payment_status(&state, &fx.user, &id, pay(0, dec!(400)))
        .await
        .unwrap_err();
    match err {
        AppError::Conflict { current, provided, .. } => {
            assert_eq!(current, 1);
            assert_eq!(provided, 0);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    let stored = get_invoice(&state, &fx.user, &id).await.unwrap();
    assert_eq!(stored.payment.amount_paid, dec!(400));
    assert_eq!(stored.payment_history.len(), 1);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn payments_outside_limits_are_rejected() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = invoice_of_1000(&state, &fx, "2031-06-30").await;
    let id = invoice.id.unwrap();

    let err = update_invoice_payment_status(&state, &fx.user, &id, pay(0, dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut cash = pay(0, dec!(100));
    cash.details = Some(PaymentDetails::Cash {
        received_by: "Front desk".into(),
    });
    let err = update_invoice_payment_status(&state, &fx.user, &id, cash)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn partially_paid_invoice_only_accepts_appended_items() {
    let Some(ctx) = common::setup_state_with(|c| c.auto_receipts = false).await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = invoice_of_1000(&state, &fx, "2031-06-30").await;
    let id = invoice.id.unwrap();

    let renamed = edit_invoice(&state, &fx.user, &id, json!({ "version": 0, "name": "Web build" }))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Web build");
    assert_eq!(renamed.version, 1);

    update_invoice_payment_status(&state, &fx.user, &id, pay(1, dec!(400)))
        .await
        .unwrap();

    let err = edit_invoice(&state, &fx.user, &id, json!({ "version": 2, "name": "Other" }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ImmutableState(_)));

    let changed = json!({
        "version": 2,
        "line_items": [
            { "description": "Build", "quantity": 1, "unit_price": 900 },
        ],
    });
    let err = edit_invoice(&state, &fx.user, &id, changed).await.unwrap_err();
    assert!(matches!(err, AppError::ImmutableState(_)));

    let appended = json!({
        "version": 2,
        "line_items": [
            { "description": "Build", "quantity": 1, "unit_price": 1000 },
            { "description": "Hosting", "quantity": 1, "unit_price": 250 },
        ],
    });
    let updated = edit_invoice(&state, &fx.user, &id, appended).await.unwrap();
    assert_eq!(updated.line_items.len(), 2);
    assert_eq!(updated.subtotal, dec!(1250));
    assert_eq!(updated.total, dec!(1290));
    assert_eq!(updated.payment.amount_paid, dec!(400));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn cancel_and_overdue_transitions() {
    let Some(ctx) = common::setup_state_with(|c| c.auto_receipts = false).await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let open = invoice_of_1000(&state, &fx, "2031-06-30").await;
    let late = invoice_of_1000(&state, &fx, "2020-01-15").await;
    let late_id = late.id.unwrap();

    state
        .invoices
        .update_one(doc! { "_id": late_id }, doc! { "$set": { "status": "sent" } })
        .await
        .unwrap();
    let flagged = check_overdue_invoices(&state, Some(&fx.user)).await.unwrap();
    assert_eq!(flagged, 1);
    let overdue = list_overdue_invoices(&state, &fx.user).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].status, InvoiceStatus::Overdue);
    assert_eq!(overdue[0].version, 1);

    // paying an overdue invoice partially keeps it overdue
    let outcome = update_invoice_payment_status(&state, &fx.user, &late_id, pay(1, dec!(100)))
        .await
        .unwrap();
    assert_eq!(outcome.invoice.status, InvoiceStatus::Overdue);

    // overdue cannot be canceled, a draft can
    let mut cancel = pay(2, Decimal::ZERO);
    cancel.amount = None;
    cancel.status = Some("canceled".into());
    let err = update_invoice_payment_status(&state, &fx.user, &late_id, cancel.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    cancel.version = 0;
    let canceled = update_invoice_payment_status(&state, &fx.user, &open.id.unwrap(), cancel)
        .await
        .unwrap();
    assert_eq!(canceled.invoice.status, InvoiceStatus::Canceled);
    assert_eq!(canceled.invoice.payment.status, PaymentStatus::Canceled);

    let err = update_invoice_payment_status(&state, &fx.user, &open.id.unwrap(), pay(1, dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn payments_issue_receipts_when_enabled() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = invoice_of_1000(&state, &fx, "2031-06-30").await;
    let id = invoice.id.unwrap();

    let outcome = update_invoice_payment_status(&state, &fx.user, &id, pay(0, dec!(250)))
        .await
        .unwrap();
    let receipt = outcome.receipt.expect("receipt generated");
    assert!(receipt.receipt_number.starts_with("RCPT-"));
    assert!(receipt.receipt_number.ends_with("-00001"));
    assert_eq!(receipt.payment.amount_paid, dec!(250));
    assert_eq!(receipt.invoice, Some(id));
    assert_eq!(receipt.items.len(), 1);
    assert!(receipt.items[0].quantity < Decimal::ONE);
    assert_eq!(receipt.items[0].unit_price, dec!(1000));

    let snapshot = receipt.invoice_snapshot.unwrap();
    assert_eq!(snapshot.invoice_number, "00001");
    assert_eq!(snapshot.previously_paid, Decimal::ZERO);
    assert_eq!(snapshot.balance_due, dec!(750));

    let linked = receipts_for_invoice(&state, &fx.user, &id).await.unwrap();
    assert_eq!(linked.len(), 1);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn incomplete_stored_details_are_not_copied_into_the_ledger() {
    let Some(ctx) = common::setup_state_with(|c| c.auto_receipts = false).await else {
        return;
    };
    let state = ctx.state.clone();
    let fx = common::fixture(&state, TemplateKind::Invoice).await;
    let invoice = invoice_of_1000(&state, &fx, "2031-06-30").await;
    let id = invoice.id.unwrap();

    let blank_phone = PaymentDetails::Mpesa {
        channel: MpesaChannel::SendMoney {
            phone_number: String::new(),
            is_new_number: false,
        },
        transaction_id: None,
    };
    state
        .invoices
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "payment.details": mongodb::bson::to_bson(&blank_phone).unwrap() } },
        )
        .await
        .unwrap();

    let err = update_invoice_payment_status(&state, &fx.user, &id, pay(0, dec!(400)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("phone_number")));
    let stored = get_invoice(&state, &fx.user, &id).await.unwrap();
    assert!(stored.payment_history.is_empty());
    assert_eq!(stored.version, 0);

    let mut with_details = pay(0, dec!(400));
    with_details.details = Some(paybill());
    let paid = update_invoice_payment_status(&state, &fx.user, &id, with_details)
        .await
        .unwrap();
    assert_eq!(paid.invoice.payment.details, paybill());
    assert_eq!(paid.invoice.payment_history[0].details, paybill());

    common::teardown(ctx).await;
}
