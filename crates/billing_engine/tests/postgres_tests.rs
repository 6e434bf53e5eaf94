//! PostgreSQL adapter tests
//!
//! `db_test!` tests start their own container; the adapter tests share one
//! per binary and truncate it first. All are ignored by default.
//! Run with `cargo test -p billing_engine --test postgres_tests -- --ignored`.

use std::sync::Arc;

use billing_engine::{BillingEngine, EngineError, EnginePorts, EngineSettings};
use core_kernel::{ClientId, Clock, LeaveType, Money};
use domain_billing::{AllocationTarget, BillingError, BillingStore, InvoiceStatus};
use domain_leave::{LeaveRepository, LeaveStatus, LeaveStatusUpdate};
use infra_db::{PostgresBillingStore, PostgresLeaveRepository};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use test_utils::{
    db_test, get_shared_test_database, DateFixtures, InvoiceBuilder, LeaveRecordBuilder, PricingFixtures,
    ReferenceFixtures, TestDatabase,
};

fn engine(pool: &sqlx::PgPool) -> BillingEngine {
    let clock: Arc<dyn Clock> = Arc::new(DateFixtures::clock());
    BillingEngine::new(EnginePorts::postgres(pool.clone()), clock, EngineSettings::default())
}

// ============================================================================
// Pricing
// ============================================================================

db_test!(test_waterfall_against_postgres, |pool| {
    let engine = engine(&pool);
    let client = ClientId::new();
    for tier in PricingFixtures::end_to_end(client).iter().chain(PricingFixtures::sparse_per_day().iter()) {
        engine.save_price_tier(tier).await.unwrap();
    }

    assert_eq!(
        engine.resolve_price(LeaveType::Sick, 5, Some(client)).await.unwrap(),
        Money::new(dec!(1500))
    );
    assert_eq!(
        engine.resolve_price(LeaveType::Sick, 1, None).await.unwrap(),
        Money::new(dec!(200))
    );
    // closest below 5 is the 3-day tier: 300 / 3 * 5
    assert_eq!(
        engine.resolve_price(LeaveType::Sick, 5, None).await.unwrap(),
        Money::new(dec!(500))
    );
});

db_test!(test_second_active_tier_for_same_key_conflicts, |pool| {
    let engine = engine(&pool);
    engine.save_price_tier(&PricingFixtures::general_daily_sick()).await.unwrap();

    let duplicate = PricingFixtures::general_daily_sick();
    let result = engine.save_price_tier(&duplicate).await;
    assert!(matches!(result, Err(EngineError::Pricing(_))));
});

// ============================================================================
// Leave records
// ============================================================================

db_test!(test_leave_round_trip_and_sweep, |pool| {
    let engine = engine(&pool);
    let (start, end) = DateFixtures::current_leave();
    let leave = engine.register_leave(LeaveType::Sick, start, end).await.unwrap();
    assert_eq!(leave.status, LeaveStatus::Active);

    let stored = engine.get_leave(leave.id).await.unwrap();
    assert_eq!(stored.reference, leave.reference);
    assert_eq!(stored.duration_days, 5);

    let report = engine.refresh_leave_statuses().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.updated, 0);
});

// ============================================================================
// Payments
// ============================================================================

db_test!(test_payment_flow_against_postgres, |pool| {
    let engine = engine(&pool);
    let client = ClientId::new();
    let invoice = engine
        .create_invoice(LeaveType::Sick, "SL2024011001", client, Money::new(dec!(1000)))
        .await
        .unwrap();
    assert!(invoice.reference.starts_with("INV-20240110-"));

    engine
        .record_payment(client, Money::new(dec!(600)), &[AllocationTarget::new(invoice.id, Money::new(dec!(600)))])
        .await
        .unwrap();
    let second = engine
        .record_payment(client, Money::new(dec!(500)), &[AllocationTarget::new(invoice.id, Money::new(dec!(400)))])
        .await
        .unwrap();

    let stored = engine.get_invoice(invoice.id).await.unwrap();
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert_eq!(stored.version, 2);

    let second_id = second.payment.unwrap().id;
    assert_eq!(engine.unallocated_amount(second_id).await.unwrap(), Money::new(dec!(100)));
    assert_eq!(engine.get_client_balance(client).await.unwrap(), Money::new(dec!(-100)));

    engine.delete_payment(second_id).await.unwrap();
    let balance = engine.invoice_balance(invoice.id).await.unwrap();
    assert_eq!(balance.total_paid, Money::new(dec!(600)));
    assert_eq!(balance.invoice.status, InvoiceStatus::PartiallyPaid);
});

db_test!(test_concurrent_payments_cannot_overfill_invoice, |pool| {
    let first_engine = engine(&pool);
    let second_engine = engine(&pool);
    let client = ClientId::new();
    let invoice = first_engine
        .create_invoice(LeaveType::Sick, "SL2024011001", client, Money::new(dec!(1000)))
        .await
        .unwrap();
    let target = [AllocationTarget::new(invoice.id, Money::new(dec!(600)))];

    let (a, b) = tokio::join!(
        first_engine.record_payment(client, Money::new(dec!(600)), &target),
        second_engine.record_payment(client, Money::new(dec!(600)), &target),
    );

    let accepted = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(accepted, 1);
    let rejected = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(
        rejected,
        EngineError::Billing(BillingError::OverAllocation { .. } | BillingError::ConcurrentModification { .. })
    ));

    let allocated: Decimal = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM payment_allocations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(allocated, dec!(600));
});

// ============================================================================
// Adapters
// ============================================================================

static SHARED_DATABASE_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// The binary's shared database, emptied and held for one test at a time
async fn shared_database() -> (Arc<TestDatabase>, tokio::sync::MutexGuard<'static, ()>) {
    let guard = SHARED_DATABASE_LOCK.lock().await;
    let db = get_shared_test_database().await;
    db.clear_data().await.unwrap();
    (db, guard)
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_cancelled_leave_row_refuses_other_statuses() {
    let (db, _guard) = shared_database().await;
    let repo = PostgresLeaveRepository::new(db.pool().clone());

    let mut leave = LeaveRecordBuilder::new().with_reference(ReferenceFixtures::leave()).build();
    repo.insert(&leave).await.unwrap();

    let cancel = LeaveStatusUpdate { id: leave.id, status: LeaveStatus::Cancelled, updated_at: chrono::Utc::now() };
    assert!(repo.update_status(&cancel).await.unwrap());

    // A refresh and a reschedule planned before the cancel landed
    let expire = LeaveStatusUpdate { status: LeaveStatus::Expired, ..cancel };
    assert!(!repo.update_status(&expire).await.unwrap());
    leave.end_date = DateFixtures::date(2024, 1, 20);
    assert!(repo.update(&leave).await.unwrap_err().is_stale());

    let stored = repo.get(leave.id).await.unwrap();
    assert_eq!(stored.status, LeaveStatus::Cancelled);
    assert_eq!(stored.end_date, DateFixtures::current_leave().1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_invoice_row_round_trip() {
    let (db, _guard) = shared_database().await;
    let store = PostgresBillingStore::new(db.pool().clone());
    let client = ClientId::new();

    let invoice = InvoiceBuilder::new()
        .with_reference(ReferenceFixtures::invoice())
        .with_client(client)
        .with_leave_type(LeaveType::Companion)
        .with_leave_reference("CL2024011001")
        .with_amount(Money::new(dec!(450)))
        .with_status(InvoiceStatus::Cancelled)
        .build();
    store.insert_invoice(&invoice).await.unwrap();

    let stored = store.get_invoice(invoice.id).await.unwrap();
    assert_eq!(stored.reference, invoice.reference);
    assert_eq!(stored.leave_type, LeaveType::Companion);
    assert_eq!(stored.leave_reference, "CL2024011001");
    assert_eq!(stored.amount, Money::new(dec!(450)));
    assert_eq!(stored.status, InvoiceStatus::Cancelled);

    let for_client: Vec<_> = store.invoices_for_client(client).await.unwrap().iter().map(|i| i.id).collect();
    assert_eq!(for_client, vec![invoice.id]);

    let duplicate = InvoiceBuilder::new().with_reference(ReferenceFixtures::invoice()).build();
    assert!(store.insert_invoice(&duplicate).await.unwrap_err().is_conflict());
}
