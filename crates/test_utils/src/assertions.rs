//! Custom Test Assertions
//!
//! Assertion helpers for billing state that name the offending record
//! when they fail.

use std::collections::HashSet;

use core_kernel::Money;
use domain_billing::payment::{totals_by_invoice, totals_by_payment};
use domain_billing::{derive_invoice_status, Invoice, Payment, PaymentAllocation};

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: Money) {
    assert!(money.is_zero(), "Expected zero, got {}", money);
}

/// Asserts the allocation invariants over a full snapshot of billing state
///
/// - every allocation is positive and points at a known payment and invoice
/// - no invoice is allocated more than its amount
/// - no payment is allocated more than its amount
/// - every non-cancelled invoice carries the status derived from its total
///
/// # Panics
///
/// Panics with the first violation found
pub fn assert_allocation_invariants(
    invoices: &[Invoice],
    payments: &[Payment],
    allocations: &[PaymentAllocation],
) {
    let payment_ids: HashSet<_> = payments.iter().map(|p| p.id).collect();
    let invoice_ids: HashSet<_> = invoices.iter().map(|i| i.id).collect();

    for allocation in allocations {
        assert!(
            allocation.amount.is_positive(),
            "Allocation {} has non-positive amount {}",
            allocation.id,
            allocation.amount
        );
        assert!(
            payment_ids.contains(&allocation.payment_id),
            "Allocation {} references missing payment {}",
            allocation.id,
            allocation.payment_id
        );
        assert!(
            invoice_ids.contains(&allocation.invoice_id),
            "Allocation {} references missing invoice {}",
            allocation.id,
            allocation.invoice_id
        );
    }

    let by_invoice = totals_by_invoice(allocations);
    for invoice in invoices {
        let paid = by_invoice.get(&invoice.id).copied().unwrap_or_default();
        assert!(
            paid <= invoice.amount,
            "Invoice {} over-allocated: paid {} of {}",
            invoice.reference,
            paid,
            invoice.amount
        );
        let expected = derive_invoice_status(invoice.status, invoice.amount, paid);
        assert_eq!(
            invoice.status, expected,
            "Invoice {} has status {} but {} is allocated against {}",
            invoice.reference, invoice.status, paid, invoice.amount
        );
    }

    let by_payment = totals_by_payment(allocations);
    for payment in payments {
        let allocated = by_payment.get(&payment.id).copied().unwrap_or_default();
        assert!(
            allocated <= payment.amount,
            "Payment {} over-allocated: {} of {}",
            payment.reference,
            allocated,
            payment.amount
        );
    }
}
