//! Invoices and their payment-driven status
//!
//! An invoice freezes the price resolved at issue time. Its status follows
//! the money allocated to it:
//!
//! ```text
//!   total_paid <= 0            -> Unpaid
//!   0 < total_paid < amount    -> PartiallyPaid
//!   total_paid >= amount       -> Paid
//! ```
//!
//! `Cancelled` is set only by [`Invoice::cancel`] and is never left by a
//! recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ClientId, InvoiceId, LeaveType, Money, StatusChange};

use crate::error::BillingError;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Nothing allocated yet
    Unpaid,
    /// Some, but not all, of the amount allocated
    PartiallyPaid,
    /// Fully covered by allocations
    Paid,
    /// Cancelled/voided by an explicit command
    Cancelled,
}

impl InvoiceStatus {
    pub fn code(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "unpaid" => Some(InvoiceStatus::Unpaid),
            "partially_paid" => Some(InvoiceStatus::PartiallyPaid),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Derives an invoice's status from its amount and allocated total
///
/// The bands are tested in order, so a zero-amount invoice with nothing
/// allocated stays `Unpaid`.
pub fn derive_invoice_status(current: InvoiceStatus, amount: Money, total_paid: Money) -> InvoiceStatus {
    if current == InvoiceStatus::Cancelled {
        return current;
    }
    if !total_paid.is_positive() {
        InvoiceStatus::Unpaid
    } else if total_paid < amount {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Paid
    }
}

/// An invoice for a leave certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Invoice number (human-readable, `INV-YYYYMMDD-NNNNN`)
    pub reference: String,
    /// Billing client
    pub client_id: ClientId,
    pub leave_type: LeaveType,
    /// Business reference of the leave record; not an owning link, the
    /// invoice stays valid after the leave is deleted
    pub leave_reference: String,
    /// Price snapshot taken when the invoice was issued
    pub amount: Money,
    pub status: InvoiceStatus,
    /// Optimistic concurrency version, bumped on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a new unpaid invoice
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a negative amount or blank references.
    pub fn new(
        reference: impl Into<String>,
        client_id: ClientId,
        leave_type: LeaveType,
        leave_reference: impl Into<String>,
        amount: Money,
    ) -> Result<Self, BillingError> {
        let reference = reference.into();
        let leave_reference = leave_reference.into();

        if reference.trim().is_empty() {
            return Err(BillingError::invalid_input("invoice reference must not be blank"));
        }
        if leave_reference.trim().is_empty() {
            return Err(BillingError::invalid_input("leave reference must not be blank"));
        }
        if amount.is_negative() {
            return Err(BillingError::invalid_input(format!(
                "invoice amount must not be negative, got {}",
                amount
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: InvoiceId::new_v7(),
            reference,
            client_id,
            leave_type,
            leave_reference,
            amount,
            status: InvoiceStatus::Unpaid,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == InvoiceStatus::Cancelled
    }

    /// Room left for allocations given the current allocated total
    pub fn remaining(&self, total_paid: Money) -> Money {
        self.amount.saturating_sub(&total_paid)
    }

    /// Status the invoice should have for `total_paid`, without mutating it
    pub fn derived_status(&self, total_paid: Money) -> StatusChange<InvoiceStatus> {
        StatusChange::between(
            self.status,
            derive_invoice_status(self.status, self.amount, total_paid),
        )
    }

    /// Re-derives the status; `updated_at` moves only on a real transition
    pub fn recompute_status(&mut self, total_paid: Money) -> StatusChange<InvoiceStatus> {
        let change = self.derived_status(total_paid);
        if let StatusChange::Changed { to, .. } = change {
            self.status = to;
            self.updated_at = Utc::now();
        }
        change
    }

    /// Cancels the invoice; cancelling twice is a no-op
    pub fn cancel(&mut self) -> StatusChange<InvoiceStatus> {
        let change = StatusChange::between(self.status, InvoiceStatus::Cancelled);
        if change.is_changed() {
            self.status = InvoiceStatus::Cancelled;
            self.updated_at = Utc::now();
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice(amount: Money) -> Invoice {
        Invoice::new("INV-20240101-00001", ClientId::new(), LeaveType::Sick, "SL2024010101", amount).unwrap()
    }

    #[test]
    fn test_status_bands() {
        let amount = Money::new(dec!(1000));
        let derive = |paid| derive_invoice_status(InvoiceStatus::Unpaid, amount, Money::new(paid));

        assert_eq!(derive(dec!(0)), InvoiceStatus::Unpaid);
        assert_eq!(derive(dec!(0.01)), InvoiceStatus::PartiallyPaid);
        assert_eq!(derive(dec!(999.99)), InvoiceStatus::PartiallyPaid);
        assert_eq!(derive(dec!(1000)), InvoiceStatus::Paid);
    }

    #[test]
    fn test_paid_invoice_falls_back_when_allocations_shrink() {
        let amount = Money::new(dec!(500));
        assert_eq!(
            derive_invoice_status(InvoiceStatus::Paid, amount, Money::new(dec!(100))),
            InvoiceStatus::PartiallyPaid
        );
        assert_eq!(
            derive_invoice_status(InvoiceStatus::Paid, amount, Money::zero()),
            InvoiceStatus::Unpaid
        );
    }

    #[test]
    fn test_cancelled_is_sticky() {
        let mut inv = invoice(Money::new(dec!(1000)));
        assert!(inv.cancel().is_changed());

        let change = inv.recompute_status(Money::new(dec!(1000)));
        assert_eq!(change, StatusChange::Unchanged(InvoiceStatus::Cancelled));
        assert!(!inv.cancel().is_changed());
    }

    #[test]
    fn test_recompute_twice_leaves_no_trace() {
        let mut inv = invoice(Money::new(dec!(1000)));
        let paid = Money::new(dec!(600));

        assert!(inv.recompute_status(paid).is_changed());
        let snapshot = inv.clone();

        assert_eq!(inv.recompute_status(paid), StatusChange::Unchanged(InvoiceStatus::PartiallyPaid));
        assert_eq!(inv, snapshot);
    }

    #[test]
    fn test_zero_amount_invoice_stays_unpaid() {
        let inv = invoice(Money::zero());
        assert_eq!(inv.derived_status(Money::zero()).current(), InvoiceStatus::Unpaid);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let result = Invoice::new("INV-1", ClientId::new(), LeaveType::Sick, "SL1", Money::new(dec!(-1)));
        assert!(matches!(result, Err(BillingError::InvalidInput(_))));
    }

    #[test]
    fn test_remaining() {
        let inv = invoice(Money::new(dec!(1000)));
        assert_eq!(inv.remaining(Money::new(dec!(600))), Money::new(dec!(400)));
        assert_eq!(inv.remaining(Money::new(dec!(1000))), Money::zero());
    }
}
