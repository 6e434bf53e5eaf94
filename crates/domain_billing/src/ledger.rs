//! Client ledger
//!
//! A read-only aggregate recomputed from the current invoices, payments and
//! allocations on every call; nothing is cached.
//!
//! # Balance
//!
//! ```text
//! balance = Σ amount(invoices, status != cancelled) - Σ amount(payments)
//! ```
//!
//! Payments count at their gross amount whether or not they are allocated,
//! so an unallocated payment already reduces what the client owes. Because
//! allocations are bounded by both the payment and the invoice amount, the
//! allocated total never exceeds either side, and
//! `unallocated_credit = total_paid - total_allocated` is never negative.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use core_kernel::{ClientId, Money};

use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::payment::{Payment, PaymentAllocation};
use crate::ports::BillingStore;

/// A client's position at the time of the call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Sum of non-cancelled invoice amounts
    pub total_invoiced: Money,
    /// Sum of gross payment amounts
    pub total_paid: Money,
    /// Sum of allocations made by the client's payments
    pub total_allocated: Money,
    /// Payment money not yet allocated to any invoice
    pub unallocated_credit: Money,
    /// `total_invoiced - total_paid`; negative when the client is in credit
    pub balance: Money,
}

impl LedgerSummary {
    /// Aggregates one client's invoices, payments and allocations
    pub fn compute(invoices: &[Invoice], payments: &[Payment], allocations: &[PaymentAllocation]) -> Self {
        let total_invoiced: Money = invoices
            .iter()
            .filter(|i| !i.is_cancelled())
            .map(|i| i.amount)
            .sum();
        let total_paid: Money = payments.iter().map(|p| p.amount).sum();
        let total_allocated: Money = allocations.iter().map(|a| a.amount).sum();

        Self {
            total_invoiced,
            total_paid,
            total_allocated,
            unallocated_credit: total_paid.saturating_sub(&total_allocated),
            balance: total_invoiced - total_paid,
        }
    }
}

pub struct ClientLedger {
    store: Arc<dyn BillingStore>,
}

impl ClientLedger {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Outstanding balance of a client
    pub async fn balance(&self, client_id: ClientId) -> Result<Money, BillingError> {
        Ok(self.summary(client_id).await?.balance)
    }

    #[instrument(skip(self))]
    pub async fn summary(&self, client_id: ClientId) -> Result<LedgerSummary, BillingError> {
        let invoices = self.store.invoices_for_client(client_id).await?;
        let payments = self.store.payments_for_client(client_id).await?;
        let allocations = self.store.allocations_for_client(client_id).await?;

        let summary = LedgerSummary::compute(&invoices, &payments, &allocations);
        debug!(
            %client_id,
            invoices = invoices.len(),
            payments = payments.len(),
            balance = %summary.balance,
            "ledger computed"
        );
        Ok(summary)
    }
}
