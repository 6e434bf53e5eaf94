//! Payments and their allocations to invoices

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use core_kernel::{AllocationId, ClientId, InvoiceId, Money, PaymentId};

use crate::error::BillingError;

/// A payment received from a billing client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier
    pub id: PaymentId,
    /// Payment number (`PAY-YYYYMMDD-NNNNN`)
    pub reference: String,
    /// Payer
    pub client_id: ClientId,
    /// Gross amount received
    pub amount: Money,
    /// Optimistic concurrency version, bumped on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new payment
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a negative amount or a blank reference.
    pub fn new(reference: impl Into<String>, client_id: ClientId, amount: Money) -> Result<Self, BillingError> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(BillingError::invalid_input("payment reference must not be blank"));
        }
        check_amount(amount)?;

        let now = Utc::now();
        Ok(Self {
            id: PaymentId::new_v7(),
            reference,
            client_id,
            amount,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Changes the gross amount
    pub fn set_amount(&mut self, amount: Money) -> Result<(), BillingError> {
        check_amount(amount)?;
        self.amount = amount;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn check_amount(amount: Money) -> Result<(), BillingError> {
    if amount.is_negative() {
        return Err(BillingError::invalid_input(format!(
            "payment amount must not be negative, got {}",
            amount
        )));
    }
    Ok(())
}

/// Payment allocation to invoices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub id: AllocationId,
    /// Payment ID
    pub payment_id: PaymentId,
    /// Invoice ID
    pub invoice_id: InvoiceId,
    /// Amount allocated to this invoice
    pub amount: Money,
    /// Allocation date
    pub allocated_at: DateTime<Utc>,
}

impl PaymentAllocation {
    pub fn new(payment_id: PaymentId, invoice_id: InvoiceId, amount: Money, allocated_at: DateTime<Utc>) -> Self {
        Self {
            id: AllocationId::new_v7(),
            payment_id,
            invoice_id,
            amount,
            allocated_at,
        }
    }
}

/// A requested share of a payment for one invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTarget {
    pub invoice_id: InvoiceId,
    pub amount: Money,
}

impl AllocationTarget {
    pub fn new(invoice_id: InvoiceId, amount: Money) -> Self {
        Self { invoice_id, amount }
    }
}

/// Sums allocation amounts per invoice
pub fn totals_by_invoice<'a>(
    allocations: impl IntoIterator<Item = &'a PaymentAllocation>,
) -> HashMap<InvoiceId, Money> {
    let mut totals: HashMap<InvoiceId, Money> = HashMap::new();
    for allocation in allocations {
        *totals.entry(allocation.invoice_id).or_default() += allocation.amount;
    }
    totals
}

/// Sums allocation amounts per payment
pub fn totals_by_payment<'a>(
    allocations: impl IntoIterator<Item = &'a PaymentAllocation>,
) -> HashMap<PaymentId, Money> {
    let mut totals: HashMap<PaymentId, Money> = HashMap::new();
    for allocation in allocations {
        *totals.entry(allocation.payment_id).or_default() += allocation.amount;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_negative_payment_rejected() {
        let result = Payment::new("PAY-20240101-00001", ClientId::new(), Money::new(dec!(-5)));
        assert!(matches!(result, Err(BillingError::InvalidInput(_))));
    }

    #[test]
    fn test_totals_by_invoice() {
        let payment = PaymentId::new();
        let (a, b) = (InvoiceId::new(), InvoiceId::new());
        let now = Utc::now();
        let allocations = vec![
            PaymentAllocation::new(payment, a, Money::new(dec!(100)), now),
            PaymentAllocation::new(payment, a, Money::new(dec!(50)), now),
            PaymentAllocation::new(payment, b, Money::new(dec!(25)), now),
        ];

        let totals = totals_by_invoice(&allocations);
        assert_eq!(totals[&a], Money::new(dec!(150)));
        assert_eq!(totals[&b], Money::new(dec!(25)));
        assert_eq!(totals_by_payment(&allocations)[&payment], Money::new(dec!(175)));
    }
}
