//! Property-Based Test Generators
//!
//! Proptest strategies for amounts, durations and random sequences of
//! allocation commands. Commands refer to invoices and payments by index so
//! a test harness can map them onto whatever it created.

use core_kernel::Money;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Positive amounts between 0.01 and 2000.00
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..=200_000i64).prop_map(Money::from_minor)
}

/// Invoice amounts in whole units, zero allowed
pub fn invoice_amount_strategy() -> impl Strategy<Value = Money> {
    (0i64..=2_000i64).prop_map(|units| Money::new(Decimal::from(units)))
}

/// Leave durations in days
pub fn duration_strategy() -> impl Strategy<Value = i64> {
    1i64..=60i64
}

/// One invoice-and-amount pair of an allocation request
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub invoice: usize,
    pub amount: Money,
}

/// A randomly generated allocation command
#[derive(Debug, Clone)]
pub enum AllocationStep {
    RecordPayment { amount: Money, targets: Vec<TargetSpec> },
    Allocate { payment: usize, targets: Vec<TargetSpec> },
    Reallocate { payment: usize, targets: Vec<TargetSpec> },
    Deallocate { payment: usize },
    DeletePayment { payment: usize },
    UpdateAmount { payment: usize, amount: Money },
    CancelInvoice { invoice: usize },
}

fn targets_strategy(invoice_count: usize) -> impl Strategy<Value = Vec<TargetSpec>> {
    prop::collection::vec(
        (0..invoice_count, positive_money_strategy())
            .prop_map(|(invoice, amount)| TargetSpec { invoice, amount }),
        0..4,
    )
}

/// A single command over `invoice_count` invoices
///
/// Payment indices are unbounded; harnesses take them modulo the number of
/// payments that exist when the step runs.
pub fn allocation_step_strategy(invoice_count: usize) -> impl Strategy<Value = AllocationStep> {
    let invoice_count = invoice_count.max(1);
    prop_oneof![
        3 => (positive_money_strategy(), targets_strategy(invoice_count))
            .prop_map(|(amount, targets)| AllocationStep::RecordPayment { amount, targets }),
        2 => (any::<usize>(), targets_strategy(invoice_count))
            .prop_map(|(payment, targets)| AllocationStep::Allocate { payment, targets }),
        2 => (any::<usize>(), targets_strategy(invoice_count))
            .prop_map(|(payment, targets)| AllocationStep::Reallocate { payment, targets }),
        1 => any::<usize>().prop_map(|payment| AllocationStep::Deallocate { payment }),
        1 => any::<usize>().prop_map(|payment| AllocationStep::DeletePayment { payment }),
        1 => (any::<usize>(), positive_money_strategy())
            .prop_map(|(payment, amount)| AllocationStep::UpdateAmount { payment, amount }),
        1 => (0..invoice_count).prop_map(|invoice| AllocationStep::CancelInvoice { invoice }),
    ]
}

/// A sequence of up to `max_len` commands
pub fn allocation_steps_strategy(invoice_count: usize, max_len: usize) -> impl Strategy<Value = Vec<AllocationStep>> {
    prop::collection::vec(allocation_step_strategy(invoice_count), 1..=max_len.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_positive_money_is_positive(money in positive_money_strategy()) {
            prop_assert!(money.is_positive());
        }

        #[test]
        fn test_targets_index_known_invoices(step in allocation_step_strategy(3)) {
            let targets = match step {
                AllocationStep::RecordPayment { targets, .. }
                | AllocationStep::Allocate { targets, .. }
                | AllocationStep::Reallocate { targets, .. } => targets,
                _ => Vec::new(),
            };
            prop_assert!(targets.iter().all(|t| t.invoice < 3));
        }
    }
}
