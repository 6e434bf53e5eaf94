//! Integration tests for the billing engine facade
//!
//! Runs full flows over the in-memory ports: pricing, leave records,
//! invoicing, payment allocation and the maintenance sweeps.

use std::sync::Arc;

use billing_engine::{BillingEngine, EngineError, EnginePorts, EngineSettings};
use core_kernel::{ClientId, Clock, LeaveType, Money, StatusChange};
use domain_billing::{AllocationTarget, BillingError, InvoiceStatus};
use domain_leave::{LeaveError, LeaveStatus};
use domain_pricing::{PriceTier, PricingError, WaterfallStep};
use rust_decimal_macros::dec;
use test_utils::{assert_money_zero, DateFixtures, PricingFixtures, ReferenceFixtures};

fn money(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount)
}

fn engine() -> BillingEngine {
    let clock: Arc<dyn Clock> = Arc::new(DateFixtures::clock());
    BillingEngine::new(EnginePorts::in_memory(), clock, EngineSettings::default())
}

async fn engine_with_tiers(tiers: Vec<PriceTier>) -> BillingEngine {
    let engine = engine();
    for tier in &tiers {
        engine.save_price_tier(tier).await.unwrap();
    }
    engine
}

// ============================================================================
// Pricing
// ============================================================================

mod pricing_tests {
    use super::*;

    #[tokio::test]
    async fn test_client_fixed_wins_before_per_day() {
        let client_a = ClientId::new();
        let engine = engine_with_tiers(PricingFixtures::end_to_end(client_a)).await;

        let price = engine.resolve_price(LeaveType::Sick, 5, Some(client_a)).await.unwrap();
        assert_eq!(price, money(dec!(1500)));

        let detailed = engine
            .resolve_price_detailed(LeaveType::Sick, 5, Some(client_a))
            .await
            .unwrap();
        assert_eq!(detailed.step, WaterfallStep::ClientFixed);
        assert!(!detailed.prorated);
    }

    #[tokio::test]
    async fn test_general_exact_without_client() {
        let engine = engine_with_tiers(PricingFixtures::end_to_end(ClientId::new())).await;

        let price = engine.resolve_price(LeaveType::Sick, 1, None).await.unwrap();
        assert_eq!(price, money(dec!(200)));
    }

    #[tokio::test]
    async fn test_other_client_falls_through_to_general() {
        let engine = engine_with_tiers(PricingFixtures::end_to_end(ClientId::new())).await;

        let detailed = engine
            .resolve_price_detailed(LeaveType::Sick, 1, Some(ClientId::new()))
            .await
            .unwrap();
        assert_eq!(detailed.step, WaterfallStep::GeneralExact);
        assert_eq!(detailed.price, money(dec!(200)));
    }

    #[tokio::test]
    async fn test_nearest_below_prorates() {
        let engine = engine_with_tiers(PricingFixtures::sparse_per_day()).await;

        // 300 / 3 * 5
        let five = engine.resolve_price_detailed(LeaveType::Sick, 5, None).await.unwrap();
        assert_eq!(five.step, WaterfallStep::GeneralBelow);
        assert!(five.prorated);
        assert_eq!(five.price, money(dec!(500)));

        // 800 / 10 * 15
        let fifteen = engine.resolve_price(LeaveType::Sick, 15, None).await.unwrap();
        assert_eq!(fifteen, money(dec!(1200)));
    }

    #[tokio::test]
    async fn test_nearest_above_keeps_flat_price() {
        let engine = engine_with_tiers(PricingFixtures::sparse_per_day()).await;

        let two = engine.resolve_price_detailed(LeaveType::Sick, 2, None).await.unwrap();
        assert_eq!(two.step, WaterfallStep::GeneralAbove);
        assert!(!two.prorated);
        assert_eq!(two.price, money(dec!(300)));
    }

    #[tokio::test]
    async fn test_no_price_found_is_an_error_not_zero() {
        let engine = engine_with_tiers(PricingFixtures::sparse_per_day()).await;

        let err = engine
            .resolve_price(LeaveType::Companion, 5, None)
            .await
            .unwrap_err();
        assert!(err.is_no_price_found());
    }

    #[tokio::test]
    async fn test_zero_priced_tier_is_a_hit() {
        let free = PriceTier::fixed(LeaveType::Companion, Money::zero()).unwrap();
        let engine = engine_with_tiers(vec![free]).await;

        let price = engine.resolve_price(LeaveType::Companion, 3, None).await.unwrap();
        assert!(price.is_zero());
    }

    #[tokio::test]
    async fn test_non_positive_duration_rejected() {
        let engine = engine_with_tiers(PricingFixtures::sparse_per_day()).await;

        for duration in [0, -3] {
            let err = engine.resolve_price(LeaveType::Sick, duration, None).await.unwrap_err();
            assert!(matches!(err, EngineError::Pricing(PricingError::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_deactivated_tier_stops_resolving() {
        let client = ClientId::new();
        let tiers = PricingFixtures::end_to_end(client);
        let fixed_id = tiers[0].id;
        let engine = engine_with_tiers(tiers).await;

        let tier = engine.deactivate_price_tier(fixed_id).await.unwrap();
        assert!(!tier.active);

        // the 1-day general tier now prorates: 200 / 1 * 5
        let price = engine.resolve_price(LeaveType::Sick, 5, Some(client)).await.unwrap();
        assert_eq!(price, money(dec!(1000)));
    }
}

// ============================================================================
// Leave records
// ============================================================================

mod leave_tests {
    use super::*;

    #[tokio::test]
    async fn test_register_derives_duration_and_status() {
        let engine = engine();
        let (start, end) = DateFixtures::past_leave();

        let leave = engine.register_leave(LeaveType::Sick, start, end).await.unwrap();
        assert_eq!(leave.duration_days, 5);
        assert_eq!(leave.status, LeaveStatus::Expired);
        assert!(leave.reference.starts_with("SL"));
    }

    #[tokio::test]
    async fn test_end_before_start_rejected() {
        let engine = engine();
        let err = engine
            .register_leave(LeaveType::Sick, DateFixtures::date(2024, 1, 5), DateFixtures::date(2024, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Leave(LeaveError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reschedule_reactivates_and_cancel_sticks() {
        let engine = engine();
        let (start, end) = DateFixtures::past_leave();
        let leave = engine.register_leave(LeaveType::Companion, start, end).await.unwrap();

        let (new_start, new_end) = DateFixtures::current_leave();
        let moved = engine.reschedule_leave(leave.id, new_start, new_end).await.unwrap();
        assert_eq!(moved.status, LeaveStatus::Active);
        assert_eq!(moved.duration_days, 5);

        let cancelled = engine.cancel_leave(leave.id).await.unwrap();
        assert_eq!(cancelled.status, LeaveStatus::Cancelled);

        let change = engine.refresh_leave_status(leave.id).await.unwrap();
        assert_eq!(change, StatusChange::Unchanged(LeaveStatus::Cancelled));
    }
}

// ============================================================================
// Invoicing and payments
// ============================================================================

mod billing_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_invoice_leave_uses_resolved_price() {
        let client = ClientId::new();
        let engine = engine_with_tiers(PricingFixtures::end_to_end(client)).await;
        let (start, end) = DateFixtures::past_leave();
        let leave = engine.register_leave(LeaveType::Sick, start, end).await.unwrap();

        let invoice = engine.invoice_leave(leave.id, client).await.unwrap();
        assert_eq!(invoice.amount, money(dec!(1500)));
        assert_eq!(invoice.leave_reference, leave.reference);
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_missing_price_blocks_invoice() {
        let client = ClientId::new();
        let engine = engine();
        let (start, end) = DateFixtures::past_leave();
        let leave = engine.register_leave(LeaveType::Sick, start, end).await.unwrap();

        let err = engine.invoice_leave(leave.id, client).await.unwrap_err();
        assert!(err.is_no_price_found());
        assert!(engine.get_client_balance(client).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_invoice_survives_leave_deletion() {
        let client = ClientId::new();
        let engine = engine_with_tiers(PricingFixtures::end_to_end(client)).await;
        let (start, end) = DateFixtures::current_leave();
        let leave = engine.register_leave(LeaveType::Sick, start, end).await.unwrap();
        let invoice = engine.invoice_leave(leave.id, client).await.unwrap();

        engine.delete_leave(leave.id).await.unwrap();

        assert!(engine.get_leave(leave.id).await.is_err());
        let kept = engine.get_invoice(invoice.id).await.unwrap();
        assert_eq!(kept.leave_reference, leave.reference);
    }

    #[tokio::test]
    async fn test_payment_lifecycle_end_to_end() {
        let client = ClientId::new();
        let engine = engine();
        let invoice = engine
            .create_invoice(LeaveType::Sick, ReferenceFixtures::leave(), client, money(dec!(1000)))
            .await
            .unwrap();

        let first = engine
            .record_payment(client, money(dec!(600)), &[AllocationTarget::new(invoice.id, money(dec!(600)))])
            .await
            .unwrap();
        assert_eq!(engine.get_invoice(invoice.id).await.unwrap().status, InvoiceStatus::PartiallyPaid);

        let second = engine
            .record_payment(client, money(dec!(500)), &[AllocationTarget::new(invoice.id, money(dec!(400)))])
            .await
            .unwrap();
        let second_id = second.payment.as_ref().unwrap().id;
        assert_eq!(engine.get_invoice(invoice.id).await.unwrap().status, InvoiceStatus::Paid);
        assert_eq!(engine.unallocated_amount(second_id).await.unwrap(), money(dec!(100)));

        // gross: 1000 invoiced - 1100 paid
        assert_eq!(engine.get_client_balance(client).await.unwrap(), money(dec!(-100)));
        let summary = engine.client_summary(client).await.unwrap();
        assert_eq!(summary.total_allocated, money(dec!(1000)));
        assert_eq!(summary.unallocated_credit, money(dec!(100)));

        let first_id = first.payment.as_ref().unwrap().id;
        assert_money_zero(engine.unallocated_amount(first_id).await.unwrap());
        engine.delete_payment(first_id).await.unwrap();
        let balance = engine.invoice_balance(invoice.id).await.unwrap();
        assert_eq!(balance.total_paid, money(dec!(400)));
        assert_eq!(balance.invoice.status, InvoiceStatus::PartiallyPaid);
    }

    #[tokio::test]
    async fn test_over_allocation_leaves_nothing_behind() {
        let client = ClientId::new();
        let engine = engine();
        let invoice = engine
            .create_invoice(LeaveType::Sick, "SL2024010101", client, money(dec!(300)))
            .await
            .unwrap();

        let err = engine
            .record_payment(client, money(dec!(500)), &[AllocationTarget::new(invoice.id, money(dec!(400)))])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Billing(BillingError::OverAllocation { .. })));

        assert_eq!(engine.get_client_balance(client).await.unwrap(), money(dec!(300)));
        assert_eq!(engine.get_invoice(invoice.id).await.unwrap().status, InvoiceStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_reallocate_and_deallocate() {
        let client = ClientId::new();
        let engine = engine();
        let a = engine
            .create_invoice(LeaveType::Sick, "SL2024010101", client, money(dec!(500)))
            .await
            .unwrap();
        let b = engine
            .create_invoice(LeaveType::Companion, "CL2024010101", client, money(dec!(500)))
            .await
            .unwrap();

        let outcome = engine
            .record_payment(client, money(dec!(500)), &[AllocationTarget::new(a.id, money(dec!(500)))])
            .await
            .unwrap();
        let payment_id = outcome.payment.unwrap().id;

        engine
            .reallocate_payment(payment_id, &[AllocationTarget::new(b.id, money(dec!(200)))])
            .await
            .unwrap();
        assert_eq!(engine.get_invoice(a.id).await.unwrap().status, InvoiceStatus::Unpaid);
        assert_eq!(engine.get_invoice(b.id).await.unwrap().status, InvoiceStatus::PartiallyPaid);

        engine
            .allocate_payment(payment_id, &[AllocationTarget::new(a.id, money(dec!(300)))])
            .await
            .unwrap();
        assert!(engine.unallocated_amount(payment_id).await.unwrap().is_zero());

        let released = engine.deallocate_payment(payment_id).await.unwrap();
        assert_eq!(released.released, 2);
        assert_eq!(engine.unallocated_amount(payment_id).await.unwrap(), money(dec!(500)));
    }

    #[tokio::test]
    async fn test_shrinking_payment_below_allocations_fails() {
        let client = ClientId::new();
        let engine = engine();
        let invoice = engine
            .create_invoice(LeaveType::Sick, "SL2024010101", client, money(dec!(1000)))
            .await
            .unwrap();
        let outcome = engine
            .record_payment(client, money(dec!(600)), &[AllocationTarget::new(invoice.id, money(dec!(600)))])
            .await
            .unwrap();
        let payment_id = outcome.payment.unwrap().id;

        let err = engine.update_payment_amount(payment_id, money(dec!(500))).await.unwrap_err();
        assert!(matches!(err, EngineError::Billing(BillingError::OverAllocation { .. })));

        let grown = engine.update_payment_amount(payment_id, money(dec!(800))).await.unwrap();
        assert_eq!(grown.payment.unwrap().amount, money(dec!(800)));
    }

    #[tokio::test]
    async fn test_cancelled_invoice_keeps_status_and_leaves_ledger() {
        let client = ClientId::new();
        let engine = engine();
        let invoice = engine
            .create_invoice(LeaveType::Sick, "SL2024010101", client, money(dec!(1000)))
            .await
            .unwrap();

        let cancelled = engine.cancel_invoice(invoice.id).await.unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert_eq!(
            engine.refresh_invoice_status(invoice.id).await.unwrap(),
            StatusChange::Unchanged(InvoiceStatus::Cancelled)
        );
        assert!(engine.get_client_balance(client).await.unwrap().is_zero());
    }
}

// ============================================================================
// Maintenance
// ============================================================================

mod maintenance_tests {
    use super::*;

    #[tokio::test]
    async fn test_maintenance_is_idempotent() {
        let client = ClientId::new();
        let engine = engine();
        let (past_start, past_end) = DateFixtures::past_leave();
        let (start, end) = DateFixtures::current_leave();
        engine.register_leave(LeaveType::Sick, past_start, past_end).await.unwrap();
        engine.register_leave(LeaveType::Sick, start, end).await.unwrap();
        let cancelled = engine.register_leave(LeaveType::Companion, start, end).await.unwrap();
        engine.cancel_leave(cancelled.id).await.unwrap();
        engine
            .create_invoice(LeaveType::Sick, ReferenceFixtures::leave(), client, money(dec!(100)))
            .await
            .unwrap();

        let first = engine.run_maintenance().await.unwrap();
        assert_eq!(first.leaves.scanned, 3);
        assert_eq!(first.leaves.cancelled_skipped, 1);
        assert_eq!(first.invoices.scanned, 1);

        let second = engine.run_maintenance().await.unwrap();
        assert_eq!(second.leaves.updated, 0);
        assert_eq!(second.invoices.updated, 0);
    }
}

// ============================================================================
// Startup
// ============================================================================

mod connect_tests {
    use super::*;
    use billing_engine::EngineConfig;

    #[tokio::test]
    async fn test_connect_rejects_invalid_config_before_dialing() {
        let config = EngineConfig {
            database_url: "  ".to_string(),
            ..EngineConfig::default()
        };

        let result = BillingEngine::connect(&config).await;
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}

// ============================================================================
// Pricing Properties
// ============================================================================

mod pricing_property_tests {
    use super::*;
    use proptest::prelude::*;
    use test_utils::duration_strategy;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #[test]
        fn prop_client_fixed_ignores_duration_and_general_scales(days in duration_strategy()) {
            runtime().block_on(async {
                let client = ClientId::new();
                let engine = engine_with_tiers(vec![
                    PricingFixtures::client_fixed_sick(client),
                    PricingFixtures::general_daily_sick(),
                ])
                .await;

                let fixed = engine.resolve_price(LeaveType::Sick, days, Some(client)).await.unwrap();
                assert_eq!(fixed, money(dec!(1500)));

                let general = engine.resolve_price(LeaveType::Sick, days, None).await.unwrap();
                assert_eq!(general, money(dec!(200) * rust_decimal::Decimal::from(days)));
            });
        }
    }
}
