//! Invoice service
//!
//! Issues invoices with fresh reference numbers, cancels them, and keeps
//! their stored status in line with their allocations: on view
//! ([`InvoiceService::refresh_invoice_status`]) and in bulk
//! ([`InvoiceService::refresh_all`]). Both refreshes only write when a status
//! actually changes, so running them twice writes nothing the second time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use core_kernel::{
    ClientId, Clock, InvoiceId, LeaveType, Money, ReferenceGenerator, ReferenceKind, StatusChange,
};

use crate::error::BillingError;
use crate::invoice::{derive_invoice_status, Invoice, InvoiceStatus};
use crate::payment::totals_by_invoice;
use crate::plan::{AllocationPlan, InvoiceBalance};
use crate::ports::BillingStore;
use crate::retry::{with_fresh_reference, with_retry, DEFAULT_MAX_ATTEMPTS};

/// Summary of an invoice refresh sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRefreshReport {
    pub scanned: usize,
    /// Invoices whose status actually changed
    pub updated: usize,
    pub cancelled_skipped: usize,
}

pub struct InvoiceService {
    store: Arc<dyn BillingStore>,
    references: ReferenceGenerator,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn BillingStore>, references: ReferenceGenerator, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            references,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Issues an unpaid invoice for a resolved (or explicitly chosen) amount
    ///
    /// A reference number taken by a concurrent insert is replaced by a new
    /// one, up to `max_attempts` times.
    #[instrument(skip(self))]
    pub async fn create_invoice(
        &self,
        client_id: ClientId,
        leave_type: LeaveType,
        leave_reference: &str,
        amount: Money,
    ) -> Result<Invoice, BillingError> {
        let invoice = with_fresh_reference("create_invoice", self.max_attempts, move || async move {
            let reference = self.references.generate(ReferenceKind::Invoice).await?;
            let invoice = Invoice::new(reference, client_id, leave_type, leave_reference, amount)?;
            self.store.insert_invoice(&invoice).await?;
            Ok(invoice)
        })
        .await?;

        info!(invoice_id = %invoice.id, reference = %invoice.reference, %amount, "invoice created");
        Ok(invoice)
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        Ok(self.store.get_invoice(id).await?)
    }

    /// The invoice with its allocated total
    pub async fn invoice_balance(&self, id: InvoiceId) -> Result<InvoiceBalance, BillingError> {
        let invoice = self.store.get_invoice(id).await?;
        let total_paid = self
            .store
            .allocations_for_invoices(&[id])
            .await?
            .iter()
            .map(|a| a.amount)
            .sum();
        Ok(InvoiceBalance { invoice, total_paid })
    }

    /// Cancels an invoice
    ///
    /// Existing allocations stay recorded; the invoice simply leaves the
    /// client's invoiced total and accepts no new allocations.
    #[instrument(skip(self))]
    pub async fn cancel_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        with_retry("cancel_invoice", self.max_attempts, move || async move {
            let invoice = self.store.get_invoice(id).await?;
            let plan = AllocationPlan::for_invoices([(&invoice, InvoiceStatus::Cancelled)], self.clock.now());
            if plan.is_empty() {
                return Ok(invoice);
            }
            self.store.commit(&plan).await?;
            info!(invoice_id = %id, from = %invoice.status, "invoice cancelled");
            Ok(self.store.get_invoice(id).await?)
        })
        .await
    }

    /// Re-derives one invoice's status from its allocations
    ///
    /// Returns `Unchanged` when no write was needed.
    #[instrument(skip(self))]
    pub async fn refresh_invoice_status(&self, id: InvoiceId) -> Result<StatusChange<InvoiceStatus>, BillingError> {
        with_retry("refresh_invoice_status", self.max_attempts, move || async move {
            let balance = self.invoice_balance(id).await?;
            let invoice = &balance.invoice;
            let next = derive_invoice_status(invoice.status, invoice.amount, balance.total_paid);

            let plan = AllocationPlan::for_invoices([(invoice, next)], self.clock.now());
            if plan.is_empty() {
                return Ok(StatusChange::Unchanged(invoice.status));
            }
            self.store.commit(&plan).await?;

            let change = StatusChange::between(invoice.status, next);
            info!(invoice_id = %id, from = %invoice.status, to = %next, "invoice status changed");
            Ok(change)
        })
        .await
    }

    /// Re-derives every invoice's status in one commit
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<InvoiceRefreshReport, BillingError> {
        let report = with_retry("refresh_all_invoice_statuses", self.max_attempts, move || async move {
            let invoices = self.store.list_invoices().await?;
            let ids: Vec<InvoiceId> = invoices.iter().map(|i| i.id).collect();
            let paid = totals_by_invoice(&self.store.allocations_for_invoices(&ids).await?);

            let mut report = InvoiceRefreshReport {
                scanned: invoices.len(),
                ..Default::default()
            };
            let mut next = Vec::with_capacity(invoices.len());
            for invoice in &invoices {
                if invoice.is_cancelled() {
                    report.cancelled_skipped += 1;
                    continue;
                }
                let total_paid = paid.get(&invoice.id).copied().unwrap_or_default();
                next.push((invoice, derive_invoice_status(invoice.status, invoice.amount, total_paid)));
            }

            let plan = AllocationPlan::for_invoices(next, self.clock.now());
            report.updated = plan.invoice_updates.len();
            if !plan.is_empty() {
                self.store.commit(&plan).await?;
            }
            Ok(report)
        })
        .await?;

        info!(
            scanned = report.scanned,
            updated = report.updated,
            cancelled_skipped = report.cancelled_skipped,
            "invoice statuses refreshed"
        );
        Ok(report)
    }
}
