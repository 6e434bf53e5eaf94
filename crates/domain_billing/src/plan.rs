//! Allocation planning
//!
//! Every change to a payment's allocations is computed here as an
//! [`AllocationPlan`] from a consistent read ([`AllocationContext`]), then
//! handed to [`BillingStore::commit`](crate::ports::BillingStore::commit),
//! which applies it in one transaction and rejects it if any touched
//! payment or invoice moved past the version it was planned against.
//!
//! Planning enforces the allocation bounds up front:
//! - every target invoice belongs to the payment's client and is not cancelled
//! - every target amount is positive
//! - the targets fit in the payment's unallocated amount
//! - each invoice's allocated total never exceeds its amount
//!
//! Re-allocation releases the payment's current allocations before the new
//! targets are measured, so an invoice in both the old and new sets sees the
//! room the payment is giving back.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use core_kernel::{AllocationId, InvoiceId, Money, PaymentId, StatusChange};

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::payment::{AllocationTarget, Payment, PaymentAllocation};

/// An invoice together with everything currently allocated to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceBalance {
    pub invoice: Invoice,
    pub total_paid: Money,
}

impl InvoiceBalance {
    pub fn remaining(&self) -> Money {
        self.invoice.remaining(self.total_paid)
    }
}

/// The read a plan is computed from
#[derive(Debug, Clone)]
pub struct AllocationContext {
    pub payment: Payment,
    /// The payment's current allocations
    pub existing: Vec<PaymentAllocation>,
    /// Every invoice in `existing` or in the requested targets
    pub invoices: HashMap<InvoiceId, InvoiceBalance>,
}

impl AllocationContext {
    pub fn allocated(&self) -> Money {
        self.existing.iter().map(|a| a.amount).sum()
    }

    /// Invoices the context must cover for these targets
    pub fn invoice_ids(existing: &[PaymentAllocation], targets: &[AllocationTarget]) -> Vec<InvoiceId> {
        existing
            .iter()
            .map(|a| a.invoice_id)
            .chain(targets.iter().map(|t| t.invoice_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// What happens to the payment row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentChange {
    /// Insert a new payment
    Create(Payment),
    /// Overwrite the payment, bumping its version
    Update { payment: Payment, expected_version: i64 },
    /// Remove the payment
    Delete { payment_id: PaymentId, expected_version: i64 },
}

/// A version-checked write to one invoice
///
/// The version is bumped even when `status` is `None`: any change to an
/// invoice's allocations must invalidate concurrent plans against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceUpdate {
    pub invoice_id: InvoiceId,
    pub expected_version: i64,
    /// New status, only when it actually changes
    pub status: Option<InvoiceStatus>,
    pub updated_at: DateTime<Utc>,
}

/// A status transition produced by a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceStatusChange {
    pub invoice_id: InvoiceId,
    pub change: StatusChange<InvoiceStatus>,
}

/// Writes to apply atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationPlan {
    pub payment: Option<PaymentChange>,
    pub release: Vec<AllocationId>,
    pub create: Vec<PaymentAllocation>,
    pub invoice_updates: Vec<InvoiceUpdate>,
    pub status_changes: Vec<InvoiceStatusChange>,
}

impl AllocationPlan {
    pub fn is_empty(&self) -> bool {
        self.payment.is_none()
            && self.release.is_empty()
            && self.create.is_empty()
            && self.invoice_updates.is_empty()
    }

    /// A plan that only moves invoice statuses (refresh, cancel)
    ///
    /// Invoices whose status would not change are left out, so an empty plan
    /// means there is nothing to write.
    pub fn for_invoices<'a>(
        updates: impl IntoIterator<Item = (&'a Invoice, InvoiceStatus)>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut plan = AllocationPlan::default();
        for (invoice, next) in updates {
            let change = StatusChange::between(invoice.status, next);
            if !change.is_changed() {
                continue;
            }
            plan.invoice_updates.push(InvoiceUpdate {
                invoice_id: invoice.id,
                expected_version: invoice.version,
                status: Some(next),
                updated_at: now,
            });
            plan.status_changes.push(InvoiceStatusChange {
                invoice_id: invoice.id,
                change,
            });
        }
        plan
    }
}

/// Plans a new payment with its first allocations
pub fn plan_new_payment(
    ctx: &AllocationContext,
    targets: &[AllocationTarget],
    now: DateTime<Utc>,
) -> Result<AllocationPlan, BillingError> {
    build(ctx, PaymentChange::Create(ctx.payment.clone()), false, targets, now)
}

/// Plans additional allocations on top of the payment's current ones
pub fn plan_allocate(
    ctx: &AllocationContext,
    targets: &[AllocationTarget],
    now: DateTime<Utc>,
) -> Result<AllocationPlan, BillingError> {
    build(ctx, touch(&ctx.payment), false, targets, now)
}

/// Plans replacing the payment's allocations with `targets`
pub fn plan_reallocate(
    ctx: &AllocationContext,
    targets: &[AllocationTarget],
    now: DateTime<Utc>,
) -> Result<AllocationPlan, BillingError> {
    build(ctx, touch(&ctx.payment), true, targets, now)
}

/// Plans releasing every allocation of the payment
pub fn plan_deallocate(ctx: &AllocationContext, now: DateTime<Utc>) -> Result<AllocationPlan, BillingError> {
    build(ctx, touch(&ctx.payment), true, &[], now)
}

/// Plans releasing every allocation and removing the payment
pub fn plan_delete(ctx: &AllocationContext, now: DateTime<Utc>) -> Result<AllocationPlan, BillingError> {
    let change = PaymentChange::Delete {
        payment_id: ctx.payment.id,
        expected_version: ctx.payment.version,
    };
    build(ctx, change, true, &[], now)
}

/// Plans changing the payment's gross amount, keeping its allocations
///
/// # Errors
///
/// `OverAllocation` if the current allocations no longer fit.
pub fn plan_amount_change(
    ctx: &AllocationContext,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<AllocationPlan, BillingError> {
    let mut payment = ctx.payment.clone();
    payment.set_amount(amount)?;
    payment.updated_at = now;

    let allocated = ctx.allocated();
    if allocated > amount {
        return Err(BillingError::OverAllocation {
            target: format!("payment {}", ctx.payment.reference),
            requested: allocated,
            available: amount,
        });
    }

    Ok(AllocationPlan {
        payment: Some(PaymentChange::Update {
            payment,
            expected_version: ctx.payment.version,
        }),
        ..Default::default()
    })
}

fn touch(payment: &Payment) -> PaymentChange {
    PaymentChange::Update {
        payment: payment.clone(),
        expected_version: payment.version,
    }
}

fn build(
    ctx: &AllocationContext,
    payment_change: PaymentChange,
    release_existing: bool,
    targets: &[AllocationTarget],
    now: DateTime<Utc>,
) -> Result<AllocationPlan, BillingError> {
    let payment = &ctx.payment;
    let mut paid: HashMap<InvoiceId, Money> = ctx
        .invoices
        .iter()
        .map(|(id, balance)| (*id, balance.total_paid))
        .collect();

    let mut plan = AllocationPlan::default();
    let mut touched: BTreeSet<InvoiceId> = BTreeSet::new();

    let capacity = if release_existing {
        for allocation in &ctx.existing {
            if let Some(total) = paid.get_mut(&allocation.invoice_id) {
                *total = total.saturating_sub(&allocation.amount);
            }
            plan.release.push(allocation.id);
            touched.insert(allocation.invoice_id);
        }
        payment.amount
    } else {
        payment.amount.saturating_sub(&ctx.allocated())
    };

    for target in targets {
        let balance = ctx
            .invoices
            .get(&target.invoice_id)
            .ok_or_else(|| BillingError::InvoiceNotFound(target.invoice_id.to_string()))?;
        check_target(payment, &balance.invoice, target)?;
    }

    let requested: Money = targets.iter().map(|t| t.amount).sum();
    if requested > capacity {
        return Err(BillingError::OverAllocation {
            target: format!("payment {}", payment.reference),
            requested,
            available: capacity,
        });
    }

    for target in targets {
        let invoice = &ctx.invoices[&target.invoice_id].invoice;
        let total = paid.entry(target.invoice_id).or_default();
        let available = invoice.remaining(*total);
        if target.amount > available {
            return Err(BillingError::OverAllocation {
                target: format!("invoice {}", invoice.reference),
                requested: target.amount,
                available,
            });
        }
        *total += target.amount;

        plan.create.push(PaymentAllocation::new(payment.id, target.invoice_id, target.amount, now));
        touched.insert(target.invoice_id);
    }

    for invoice_id in touched {
        let Some(balance) = ctx.invoices.get(&invoice_id) else {
            continue;
        };
        let total = paid.get(&invoice_id).copied().unwrap_or_default();
        let change = balance.invoice.derived_status(total);
        let status = match change {
            StatusChange::Changed { to, .. } => Some(to),
            StatusChange::Unchanged(_) => None,
        };

        plan.invoice_updates.push(InvoiceUpdate {
            invoice_id,
            expected_version: balance.invoice.version,
            status,
            updated_at: now,
        });
        plan.status_changes.push(InvoiceStatusChange { invoice_id, change });
    }

    plan.payment = Some(payment_change);
    Ok(plan)
}

fn check_target(payment: &Payment, invoice: &Invoice, target: &AllocationTarget) -> Result<(), BillingError> {
    if !target.amount.is_positive() {
        return Err(BillingError::invalid_input(format!(
            "allocation to invoice {} must be positive, got {}",
            invoice.reference, target.amount
        )));
    }
    if invoice.client_id != payment.client_id {
        return Err(BillingError::invalid_input(format!(
            "invoice {} belongs to client {}, payment {} to client {}",
            invoice.reference, invoice.client_id, payment.reference, payment.client_id
        )));
    }
    if invoice.is_cancelled() {
        return Err(BillingError::invalid_input(format!(
            "invoice {} is cancelled",
            invoice.reference
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{ClientId, LeaveType};
    use rust_decimal_macros::dec;

    fn money(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount)
    }

    fn invoice(client: ClientId, amount: Money) -> Invoice {
        Invoice::new("INV-20240101-00001", client, LeaveType::Sick, "SL2024010101", amount).unwrap()
    }

    fn context(payment: Payment, existing: Vec<PaymentAllocation>, invoices: Vec<(Invoice, Money)>) -> AllocationContext {
        AllocationContext {
            payment,
            existing,
            invoices: invoices
                .into_iter()
                .map(|(invoice, total_paid)| (invoice.id, InvoiceBalance { invoice, total_paid }))
                .collect(),
        }
    }

    #[test]
    fn test_plan_creates_allocations_and_status_updates() {
        let client = ClientId::new();
        let inv = invoice(client, money(dec!(1000)));
        let payment = Payment::new("PAY-20240101-00001", client, money(dec!(600))).unwrap();
        let ctx = context(payment, vec![], vec![(inv.clone(), Money::zero())]);

        let plan = plan_new_payment(&ctx, &[AllocationTarget::new(inv.id, money(dec!(600)))], Utc::now()).unwrap();

        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.invoice_updates.len(), 1);
        assert_eq!(plan.invoice_updates[0].status, Some(InvoiceStatus::PartiallyPaid));
        assert_eq!(plan.invoice_updates[0].expected_version, inv.version);
        assert!(matches!(plan.payment, Some(PaymentChange::Create(_))));
    }

    #[test]
    fn test_over_allocating_payment_rejected() {
        let client = ClientId::new();
        let a = invoice(client, money(dec!(1000)));
        let b = invoice(client, money(dec!(1000)));
        let payment = Payment::new("PAY-1", client, money(dec!(500))).unwrap();
        let ctx = context(payment, vec![], vec![(a.clone(), Money::zero()), (b.clone(), Money::zero())]);

        let targets = [
            AllocationTarget::new(a.id, money(dec!(300))),
            AllocationTarget::new(b.id, money(dec!(300))),
        ];
        let err = plan_new_payment(&ctx, &targets, Utc::now()).unwrap_err();
        assert!(matches!(err, BillingError::OverAllocation { requested, .. } if requested == money(dec!(600))));
    }

    #[test]
    fn test_over_allocating_invoice_rejected() {
        let client = ClientId::new();
        let inv = invoice(client, money(dec!(1000)));
        let payment = Payment::new("PAY-1", client, money(dec!(500))).unwrap();
        let ctx = context(payment, vec![], vec![(inv.clone(), money(dec!(600)))]);

        let err = plan_new_payment(&ctx, &[AllocationTarget::new(inv.id, money(dec!(500)))], Utc::now()).unwrap_err();
        assert!(matches!(err, BillingError::OverAllocation { available, .. } if available == money(dec!(400))));
    }

    #[test]
    fn test_duplicate_targets_share_invoice_room() {
        let client = ClientId::new();
        let inv = invoice(client, money(dec!(100)));
        let payment = Payment::new("PAY-1", client, money(dec!(500))).unwrap();
        let ctx = context(payment, vec![], vec![(inv.clone(), Money::zero())]);

        let targets = [
            AllocationTarget::new(inv.id, money(dec!(60))),
            AllocationTarget::new(inv.id, money(dec!(60))),
        ];
        assert!(matches!(
            plan_new_payment(&ctx, &targets, Utc::now()),
            Err(BillingError::OverAllocation { .. })
        ));
    }

    #[test]
    fn test_client_mismatch_rejected() {
        let inv = invoice(ClientId::new(), money(dec!(100)));
        let payment = Payment::new("PAY-1", ClientId::new(), money(dec!(100))).unwrap();
        let ctx = context(payment, vec![], vec![(inv.clone(), Money::zero())]);

        let err = plan_new_payment(&ctx, &[AllocationTarget::new(inv.id, money(dec!(10)))], Utc::now()).unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)));
    }

    #[test]
    fn test_non_positive_target_rejected() {
        let client = ClientId::new();
        let inv = invoice(client, money(dec!(100)));
        let payment = Payment::new("PAY-1", client, money(dec!(100))).unwrap();
        let ctx = context(payment, vec![], vec![(inv.clone(), Money::zero())]);

        for amount in [dec!(0), dec!(-10)] {
            let result = plan_new_payment(&ctx, &[AllocationTarget::new(inv.id, money(amount))], Utc::now());
            assert!(matches!(result, Err(BillingError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_reallocate_releases_before_measuring() {
        let client = ClientId::new();
        let inv = invoice(client, money(dec!(100)));
        let payment = Payment::new("PAY-1", client, money(dec!(100))).unwrap();
        let existing = PaymentAllocation::new(payment.id, inv.id, money(dec!(100)), Utc::now());
        let ctx = context(payment, vec![existing.clone()], vec![(inv.clone(), money(dec!(100)))]);

        // Same invoice, same amount: only fits because the old share is released first
        let plan = plan_reallocate(&ctx, &[AllocationTarget::new(inv.id, money(dec!(100)))], Utc::now()).unwrap();
        assert_eq!(plan.release, vec![existing.id]);
        assert_eq!(plan.create.len(), 1);

        // Plain allocate has no room left on the payment
        assert!(matches!(
            plan_allocate(&ctx, &[AllocationTarget::new(inv.id, money(dec!(1)))], Utc::now()),
            Err(BillingError::OverAllocation { .. })
        ));
    }

    #[test]
    fn test_amount_change_below_allocated_rejected() {
        let client = ClientId::new();
        let inv = invoice(client, money(dec!(1000)));
        let payment = Payment::new("PAY-1", client, money(dec!(600))).unwrap();
        let existing = PaymentAllocation::new(payment.id, inv.id, money(dec!(600)), Utc::now());
        let ctx = context(payment, vec![existing], vec![(inv, money(dec!(600)))]);

        assert!(plan_amount_change(&ctx, money(dec!(700)), Utc::now()).is_ok());
        assert!(matches!(
            plan_amount_change(&ctx, money(dec!(599.99)), Utc::now()),
            Err(BillingError::OverAllocation { .. })
        ));
    }

    #[test]
    fn test_invoice_only_plan_skips_unchanged() {
        let inv = invoice(ClientId::new(), money(dec!(100)));

        let plan = AllocationPlan::for_invoices([(&inv, InvoiceStatus::Unpaid)], Utc::now());
        assert!(plan.is_empty());

        let plan = AllocationPlan::for_invoices([(&inv, InvoiceStatus::Cancelled)], Utc::now());
        assert_eq!(plan.invoice_updates.len(), 1);
        assert_eq!(plan.invoice_updates[0].status, Some(InvoiceStatus::Cancelled));
    }
}
