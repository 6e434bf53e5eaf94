//! Payment allocation service
//!
//! Each command runs a read-plan-commit cycle against the [`BillingStore`]:
//! load the payment, its allocations and the affected invoices, build an
//! [`AllocationPlan`], and commit it atomically. A version conflict restarts
//! the cycle from a fresh read, up to `max_attempts` times.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use core_kernel::{
    ClientId, Clock, Money, PaymentId, ReferenceGenerator, ReferenceKind, StatusChange,
};

use crate::error::BillingError;
use crate::payment::{totals_by_invoice, AllocationTarget, Payment, PaymentAllocation};
use crate::plan::{
    self, AllocationContext, AllocationPlan, InvoiceBalance, InvoiceStatusChange, PaymentChange,
};
use crate::ports::BillingStore;
use crate::retry::{with_fresh_reference, with_retry, DEFAULT_MAX_ATTEMPTS};

/// Result of a committed allocation command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationOutcome {
    /// The payment as stored after the commit; `None` once deleted
    pub payment: Option<Payment>,
    /// Allocations created by the command
    pub created: Vec<PaymentAllocation>,
    /// Number of allocations released
    pub released: usize,
    /// Status of every invoice the command touched
    pub status_changes: Vec<InvoiceStatusChange>,
}

enum PaymentSource<'a> {
    New(&'a Payment),
    Existing(PaymentId),
}

type Planner = fn(&AllocationContext, &[AllocationTarget], DateTime<Utc>) -> Result<AllocationPlan, BillingError>;

/// Allocates payments across a client's invoices
pub struct PaymentAllocator {
    store: Arc<dyn BillingStore>,
    references: ReferenceGenerator,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl PaymentAllocator {
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

    /// Records a payment and its allocations in one commit
    ///
    /// # Arguments
    ///
    /// * `client_id` - The paying client; every target must be theirs
    /// * `amount` - Gross amount received, zero or more
    /// * `targets` - Invoices to allocate to; may be empty to keep the whole
    ///   payment as unallocated credit
    ///
    /// # Returns
    ///
    /// The stored payment, the allocations created and the resulting status
    /// of every invoice touched.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a negative amount or a bad target,
    /// `OverAllocation` if the targets do not fit; nothing is stored then.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn record_payment(
        &self,
        client_id: ClientId,
        amount: Money,
        targets: &[AllocationTarget],
    ) -> Result<AllocationOutcome, BillingError> {
        with_fresh_reference("record_payment", self.max_attempts, move || async move {
            let reference = self.references.generate(ReferenceKind::Payment).await?;
            let payment = Payment::new(reference, client_id, amount)?;
            self.execute("record_payment", PaymentSource::New(&payment), targets, plan::plan_new_payment)
                .await
        })
        .await
    }

    /// Adds allocations on top of the payment's existing ones
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn allocate(
        &self,
        payment_id: PaymentId,
        targets: &[AllocationTarget],
    ) -> Result<AllocationOutcome, BillingError> {
        self.execute("allocate", PaymentSource::Existing(payment_id), targets, plan::plan_allocate)
            .await
    }

    /// Replaces the payment's allocations with `targets`
    ///
    /// The old allocations are released before the new ones are measured,
    /// all in the same commit.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn reallocate(
        &self,
        payment_id: PaymentId,
        targets: &[AllocationTarget],
    ) -> Result<AllocationOutcome, BillingError> {
        self.execute("reallocate", PaymentSource::Existing(payment_id), targets, plan::plan_reallocate)
            .await
    }

    /// Releases every allocation of the payment and keeps the payment
    #[instrument(skip(self))]
    pub async fn deallocate(&self, payment_id: PaymentId) -> Result<AllocationOutcome, BillingError> {
        self.execute("deallocate", PaymentSource::Existing(payment_id), &[], |ctx, _, now| {
            plan::plan_deallocate(ctx, now)
        })
        .await
    }

    /// Releases every allocation of the payment and deletes it
    #[instrument(skip(self))]
    pub async fn delete_payment(&self, payment_id: PaymentId) -> Result<AllocationOutcome, BillingError> {
        self.execute("delete_payment", PaymentSource::Existing(payment_id), &[], |ctx, _, now| {
            plan::plan_delete(ctx, now)
        })
        .await
    }

    /// Changes a payment's gross amount
    ///
    /// # Errors
    ///
    /// `OverAllocation` if the payment's current allocations exceed the new
    /// amount; reallocate first in that case.
    #[instrument(skip(self))]
    pub async fn update_payment_amount(
        &self,
        payment_id: PaymentId,
        amount: Money,
    ) -> Result<AllocationOutcome, BillingError> {
        let source = PaymentSource::Existing(payment_id);
        let source = &source;
        with_retry("update_payment_amount", self.max_attempts, move || async move {
            let ctx = self.load_context(source, &[]).await?;
            let plan = plan::plan_amount_change(&ctx, amount, self.clock.now())?;
            self.store.commit(&plan).await?;
            Ok(self.finish(plan))
        })
        .await
    }

    /// The payment and its current allocations
    pub async fn payment_with_allocations(
        &self,
        payment_id: PaymentId,
    ) -> Result<(Payment, Vec<PaymentAllocation>), BillingError> {
        let payment = self.store.get_payment(payment_id).await?;
        let allocations = self.store.allocations_for_payment(payment_id).await?;
        Ok((payment, allocations))
    }

    /// Part of the payment not yet allocated to any invoice
    pub async fn unallocated(&self, payment_id: PaymentId) -> Result<Money, BillingError> {
        let (payment, allocations) = self.payment_with_allocations(payment_id).await?;
        let allocated: Money = allocations.iter().map(|a| a.amount).sum();
        Ok(payment.amount.saturating_sub(&allocated))
    }

    async fn execute(
        &self,
        operation: &'static str,
        source: PaymentSource<'_>,
        targets: &[AllocationTarget],
        planner: Planner,
    ) -> Result<AllocationOutcome, BillingError> {
        let source = &source;
        with_retry(operation, self.max_attempts, move || async move {
            let ctx = self.load_context(source, targets).await?;
            let plan = planner(&ctx, targets, self.clock.now())?;
            self.store.commit(&plan).await?;
            Ok(self.finish(plan))
        })
        .await
    }

    /// Reads the payment before its allocations and the invoices before
    /// theirs, so a commit landing in between shows up as a stale version.
    async fn load_context(
        &self,
        source: &PaymentSource<'_>,
        targets: &[AllocationTarget],
    ) -> Result<AllocationContext, BillingError> {
        let (payment, existing) = match source {
            PaymentSource::New(payment) => ((*payment).clone(), Vec::new()),
            PaymentSource::Existing(id) => {
                let payment = self.store.get_payment(*id).await?;
                let existing = self.store.allocations_for_payment(*id).await?;
                (payment, existing)
            }
        };

        let ids = AllocationContext::invoice_ids(&existing, targets);
        let invoices = self.store.get_invoices(&ids).await?;
        let paid = totals_by_invoice(&self.store.allocations_for_invoices(&ids).await?);

        let invoices = invoices
            .into_iter()
            .map(|invoice| {
                let total_paid = paid.get(&invoice.id).copied().unwrap_or_default();
                (invoice.id, InvoiceBalance { invoice, total_paid })
            })
            .collect();

        debug!(payment_id = %payment.id, version = payment.version, existing = existing.len(), "allocation context loaded");
        Ok(AllocationContext { payment, existing, invoices })
    }

    fn finish(&self, plan: AllocationPlan) -> AllocationOutcome {
        let payment = match plan.payment {
            Some(PaymentChange::Create(payment)) => Some(payment),
            Some(PaymentChange::Update { mut payment, expected_version }) => {
                payment.version = expected_version + 1;
                Some(payment)
            }
            Some(PaymentChange::Delete { payment_id, .. }) => {
                info!(%payment_id, "payment deleted");
                None
            }
            None => None,
        };

        for status in &plan.status_changes {
            if let StatusChange::Changed { from, to } = status.change {
                info!(invoice_id = %status.invoice_id, %from, %to, "invoice status changed");
            }
        }
        if let Some(payment) = &payment {
            info!(
                payment_id = %payment.id,
                reference = %payment.reference,
                created = plan.create.len(),
                released = plan.release.len(),
                "payment allocations committed"
            );
        }

        AllocationOutcome {
            payment,
            created: plan.create,
            released: plan.release.len(),
            status_changes: plan.status_changes,
        }
    }
}
