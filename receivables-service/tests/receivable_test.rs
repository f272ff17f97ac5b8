//! Receivable lifecycle integration tests.

mod common;

use chrono::{Duration, NaiveDate};
use common::{assert_reconciled, money, TestLedger};
use receivables_service::error::LedgerError;
use receivables_service::models::{
    NewPayment, PaymentMethod, ReceivableStatus, UpdateReceivable,
};
use receivables_service::services::{OverpaymentPolicy, ReceivableStore};
use rust_decimal::Decimal;
use uuid::Uuid;

fn payment(t: &TestLedger, amount: &str, method: PaymentMethod) -> NewPayment {
    NewPayment {
        amount: money(amount),
        method,
        payment_date: t.ledger.today(),
        notes: None,
    }
}

#[tokio::test]
async fn create_without_payment_is_pending() {
    let t = TestLedger::new().await;
    let today = t.ledger.today();

    let r = t.sale("Phone", "150.00").await;

    assert_eq!(r.status, ReceivableStatus::Pending);
    assert_eq!(r.remaining_amount, money("150.00"));
    assert!(r.payments.is_empty());
    assert_eq!(r.due_date, today);
    assert!(!r.sold_on_credit);
    assert_reconciled(&r);
}

#[tokio::test]
async fn initial_payment_becomes_first_payment() {
    let t = TestLedger::new().await;
    let mut input = t.sale_input("Phone", "150.00");
    input.paid_amount = money("50");
    input.payment_method = PaymentMethod::Card;

    let r = t.sale_with(input).await;

    assert_eq!(r.status, ReceivableStatus::Partial);
    assert_eq!(r.payments.len(), 1);
    assert_eq!(r.payments[0].amount, money("50"));
    assert_eq!(r.payments[0].method, PaymentMethod::Card);
    assert_eq!(r.remaining_amount, money("100.00"));
    assert_reconciled(&r);

    let mut input = t.sale_input("Case", "20.00");
    input.paid_amount = money("20.00");
    let paid = t.sale_with(input).await;
    assert_eq!(paid.status, ReceivableStatus::Paid);
    assert_eq!(paid.remaining_amount, Decimal::ZERO);
}

#[tokio::test]
async fn create_rounds_to_cents() {
    let t = TestLedger::new().await;
    let r = t.sale("Cable", "10.005").await;
    assert_eq!(r.total_amount, money("10.01"));
}

#[tokio::test]
async fn create_validation() {
    let t = TestLedger::new().await;

    let cases = [
        {
            let mut i = t.sale_input("Phone", "0");
            i.total_amount = Decimal::ZERO;
            i
        },
        {
            let mut i = t.sale_input("Phone", "100");
            i.paid_amount = money("100.01");
            i
        },
        {
            let mut i = t.sale_input("Phone", "100");
            i.paid_amount = money("-1");
            i
        },
        t.sale_input("   ", "100"),
        {
            let mut i = t.sale_input("Phone", "100");
            i.warranty_period_days = -1;
            i
        },
        {
            let mut i = t.sale_input("Phone", "100");
            i.cost_price = Some(money("-5"));
            i
        },
    ];

    for input in cases {
        let err = t.ledger.create_receivable(input).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)), "got {err:?}");
    }

    let mut stranger = t.sale_input("Phone", "100");
    stranger.customer_id = Uuid::new_v4();
    assert!(matches!(
        t.ledger.create_receivable(stranger).await,
        Err(LedgerError::NotFound { entity: "customer", .. })
    ));

    assert!(t.ledger.list_active(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn add_payment_moves_through_statuses() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;

    let partial = t
        .ledger
        .add_payment(r.receivable_id, payment(&t, "40", PaymentMethod::Pix))
        .await
        .unwrap();
    assert_eq!(partial.status, ReceivableStatus::Partial);
    assert_eq!(partial.remaining_amount, money("60.00"));

    let paid = t
        .ledger
        .add_payment(r.receivable_id, payment(&t, "60", PaymentMethod::Cash))
        .await
        .unwrap();
    assert_eq!(paid.status, ReceivableStatus::Paid);
    assert_eq!(paid.payments.len(), 2);
    assert_reconciled(&paid);
}

#[tokio::test]
async fn add_payment_rejects_overshoot_and_zero() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;

    let over = t
        .ledger
        .add_payment(r.receivable_id, payment(&t, "100.01", PaymentMethod::Cash))
        .await;
    assert!(matches!(over, Err(LedgerError::Validation(_))));

    let zero = t
        .ledger
        .add_payment(r.receivable_id, payment(&t, "0", PaymentMethod::Cash))
        .await;
    assert!(matches!(zero, Err(LedgerError::Validation(_))));

    let unknown = t
        .ledger
        .add_payment(Uuid::new_v4(), payment(&t, "1", PaymentMethod::Cash))
        .await;
    assert!(matches!(unknown, Err(LedgerError::NotFound { .. })));

    assert!(t.reload(r.receivable_id).await.payments.is_empty());
}

#[tokio::test]
async fn stale_payment_write_conflicts() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;
    t.ledger
        .add_payment(r.receivable_id, payment(&t, "10", PaymentMethod::Cash))
        .await
        .unwrap();

    // A writer that still believes nothing was paid.
    let mut stale = r.clone();
    stale.paid_amount = money("5");
    let err = t.store.record_payment(&stale, Decimal::ZERO).await.unwrap_err();

    assert!(matches!(err, LedgerError::Conflict(id) if id == r.receivable_id));
    assert_eq!(t.reload(r.receivable_id).await.paid_amount, money("10"));
}

#[tokio::test]
async fn stale_save_cannot_erase_a_payment() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;
    let mut stale = t.ledger.get_receivable(r.receivable_id).await.unwrap();

    t.ledger
        .add_payment(r.receivable_id, payment(&t, "40", PaymentMethod::Cash))
        .await
        .unwrap();

    stale.notes = Some("edited from an old copy".to_string());
    let err = t.store.save(&stale).await.unwrap_err();

    assert!(matches!(err, LedgerError::Conflict(id) if id == r.receivable_id));
    let stored = t.reload(r.receivable_id).await;
    assert_eq!(stored.paid_amount, money("40"));
    assert_eq!(stored.remaining_amount, money("60"));
    assert_eq!(stored.status, ReceivableStatus::Partial);
    assert_eq!(stored.notes, None);
    assert_reconciled(&stored);
}

#[tokio::test]
async fn archive_toggle_keeps_payment_totals() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;
    t.ledger
        .add_payment(r.receivable_id, payment(&t, "40", PaymentMethod::Pix))
        .await
        .unwrap();

    let archived = t.ledger.set_archived(r.receivable_id, true).await.unwrap();

    assert!(archived.archived);
    assert_eq!(archived.paid_amount, money("40"));
    assert_eq!(archived.payments.len(), 1);
    assert_reconciled(&archived);
}

#[tokio::test]
async fn edit_is_locked_after_payment() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;
    t.ledger
        .add_payment(r.receivable_id, payment(&t, "10", PaymentMethod::Cash))
        .await
        .unwrap();

    let locked = t
        .ledger
        .update_receivable(
            r.receivable_id,
            UpdateReceivable {
                total_amount: Some(money("90")),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(locked, Err(LedgerError::Locked { .. })));

    let new_due = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    let edited = t
        .ledger
        .update_receivable(
            r.receivable_id,
            UpdateReceivable {
                due_date: Some(new_due),
                notes: Some("pays on the 30th".to_string()),
                warranty_period_days: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.due_date, new_due);
    assert_eq!(edited.warranty_period_days, 30);
    assert_eq!(edited.paid_amount, money("10"));
    assert_eq!(edited.payments.len(), 1);
}

#[tokio::test]
async fn edit_total_before_payment_recomputes() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;

    let edited = t
        .ledger
        .update_receivable(
            r.receivable_id,
            UpdateReceivable {
                product_name: Some("Phone X".to_string()),
                total_amount: Some(money("80")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(edited.product_name, "Phone X");
    assert_eq!(edited.total_amount, money("80"));
    assert_eq!(edited.remaining_amount, money("80"));
    assert_reconciled(&edited);
}

#[tokio::test]
async fn purge_rules() {
    let t = TestLedger::new().await;
    let unpaid = t.sale("Cable", "15.00").await;
    t.ledger.purge_receivable(unpaid.receivable_id).await.unwrap();
    assert!(t.store.get_any(unpaid.receivable_id).await.unwrap().is_none());

    let mut input = t.sale_input("Phone", "100.00");
    input.paid_amount = money("30");
    let paid = t.sale_with(input).await;
    assert!(matches!(
        t.ledger.purge_receivable(paid.receivable_id).await,
        Err(LedgerError::Locked { .. })
    ));

    t.ledger.refund_receivable(paid.receivable_id, false).await.unwrap();
    t.ledger.purge_receivable(paid.receivable_id).await.unwrap();
    assert!(matches!(
        t.ledger.purge_receivable(paid.receivable_id).await,
        Err(LedgerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn restore_soft_deleted() {
    let t = TestLedger::new().await;
    let r = t.sale("Phone", "100.00").await;
    t.ledger.refund_receivable(r.receivable_id, false).await.unwrap();
    assert!(t.ledger.get_receivable(r.receivable_id).await.is_err());

    let restored = t.ledger.restore_receivable(r.receivable_id).await.unwrap();
    assert!(!restored.is_deleted());

    // Restoring a live receivable is a no-op.
    let again = t.ledger.restore_receivable(r.receivable_id).await.unwrap();
    assert_eq!(again.receivable_id, r.receivable_id);
}

#[tokio::test]
async fn customer_summary_counts_overdue() {
    let t = TestLedger::new().await;
    let mut later = t.sale_input("Tablet", "300.00");
    later.due_date = Some(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
    t.sale_with(later).await;
    let mut overdue = t.sale_input("Phone", "100.00");
    overdue.paid_amount = money("25");
    t.sale_with(overdue).await;
    let mut settled = t.sale_input("Case", "20.00");
    settled.paid_amount = money("20");
    t.sale_with(settled).await;
    t.ledger
        .add_credit(t.customer_id, money("12.50"), "goodwill")
        .await
        .unwrap();

    let summary = t.ledger.customer_summary(t.customer_id).await.unwrap();

    assert_eq!(summary.open_count, 2);
    assert_eq!(summary.total_owed, money("375.00"));
    assert_eq!(summary.overdue_count, 1);
    assert_eq!(summary.overdue_amount, money("75.00"));
    assert_eq!(summary.credit_balance, money("12.50"));
}

#[tokio::test]
async fn cached_listing_reflects_writes() {
    let t = TestLedger::build(OverpaymentPolicy::Report, true).await;
    let r = t.sale("Phone", "100.00").await;

    let before = t.ledger.list_active(Some(t.customer_id)).await.unwrap();
    assert_eq!(before[0].paid_amount, Decimal::ZERO);

    t.ledger
        .add_payment(r.receivable_id, payment(&t, "30", PaymentMethod::Pix))
        .await
        .unwrap();
    let after = t.ledger.list_active(Some(t.customer_id)).await.unwrap();
    assert_eq!(after[0].paid_amount, money("30"));

    t.sale("Case", "20.00").await;
    assert_eq!(t.ledger.list_active(Some(t.customer_id)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn catalog_is_told_about_credit_sales() {
    let t = TestLedger::new().await;
    let product_id = Uuid::new_v4();
    let mut input = t.sale_input("Phone", "100.00");
    input.product_id = Some(product_id);

    let r = t.sale_with(input).await;

    assert!(r.sold_on_credit);
    assert!(t.reload(r.receivable_id).await.sold_on_credit);
    match t.catalog.calls().as_slice() {
        [common::CatalogCall::MarkSoldOnCredit {
            product_id: p,
            buyer_name,
            amount,
            receivable_id,
        }] => {
            assert_eq!(*p, product_id);
            assert_eq!(buyer_name, "Maria Souza");
            assert_eq!(*amount, money("100.00"));
            assert_eq!(*receivable_id, r.receivable_id);
        }
        other => panic!("unexpected catalog calls: {other:?}"),
    }
}

#[tokio::test]
async fn catalog_failure_keeps_the_sale() {
    let t = TestLedger::new().await;
    t.catalog.fail_mark(true);
    let mut input = t.sale_input("Phone", "100.00");
    input.product_id = Some(Uuid::new_v4());

    let r = t.sale_with(input).await;

    assert!(!r.sold_on_credit);
    assert!(t.catalog.calls().is_empty());
    assert!(t.ledger.get_receivable(r.receivable_id).await.is_ok());
}

#[tokio::test]
async fn receivables_are_listed_oldest_first() {
    let t = TestLedger::new().await;
    let first = t.sale("A", "10.00").await;
    t.clock.advance(Duration::hours(3));
    let second = t.sale("B", "10.00").await;

    let rows = t.ledger.list_active(Some(t.customer_id)).await.unwrap();
    assert_eq!(rows[0].receivable_id, first.receivable_id);
    assert_eq!(rows[1].receivable_id, second.receivable_id);
}
