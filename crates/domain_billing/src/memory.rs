//! In-memory billing store
//!
//! One lock guards invoices, payments and allocations together, so a commit
//! validates every version and applies every write without interleaving.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use core_kernel::{
    AllocationId, ClientId, DomainPort, InvoiceId, PaymentId, PortError, ReferenceKind,
    ReferenceRegistry,
};

use crate::invoice::Invoice;
use crate::payment::{Payment, PaymentAllocation};
use crate::plan::{AllocationPlan, PaymentChange};
use crate::ports::BillingStore;

#[derive(Debug, Default)]
struct BillingState {
    invoices: BTreeMap<InvoiceId, Invoice>,
    payments: BTreeMap<PaymentId, Payment>,
    allocations: BTreeMap<AllocationId, PaymentAllocation>,
}

#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    state: RwLock<BillingState>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every allocation in the store, for invariant checks in tests
    pub fn all_allocations(&self) -> Result<Vec<PaymentAllocation>, PortError> {
        Ok(self.read()?.allocations.values().cloned().collect())
    }

    /// Every payment in the store
    pub fn all_payments(&self) -> Result<Vec<Payment>, PortError> {
        Ok(self.read()?.payments.values().cloned().collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BillingState>, PortError> {
        self.state
            .read()
            .map_err(|_| PortError::internal("billing store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BillingState>, PortError> {
        self.state
            .write()
            .map_err(|_| PortError::internal("billing store lock poisoned"))
    }
}

fn oldest_first<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

impl BillingState {
    fn validate(&self, plan: &AllocationPlan) -> Result<(), PortError> {
        match &plan.payment {
            Some(PaymentChange::Create(payment)) => {
                if self.payments.values().any(|p| p.reference == payment.reference) {
                    return Err(PortError::conflict(format!(
                        "payment reference {} already exists",
                        payment.reference
                    )));
                }
            }
            Some(PaymentChange::Update { payment, expected_version }) => {
                self.check_payment(payment.id, *expected_version)?;
            }
            Some(PaymentChange::Delete { payment_id, expected_version }) => {
                self.check_payment(*payment_id, *expected_version)?;
            }
            None => {}
        }

        for update in &plan.invoice_updates {
            let invoice = self
                .invoices
                .get(&update.invoice_id)
                .ok_or_else(|| PortError::not_found("Invoice", update.invoice_id))?;
            if invoice.version != update.expected_version {
                return Err(PortError::stale("Invoice", update.invoice_id));
            }
        }
        Ok(())
    }

    fn check_payment(&self, id: PaymentId, expected_version: i64) -> Result<(), PortError> {
        let payment = self
            .payments
            .get(&id)
            .ok_or_else(|| PortError::not_found("Payment", id))?;
        if payment.version != expected_version {
            return Err(PortError::stale("Payment", id));
        }
        Ok(())
    }

    fn apply(&mut self, plan: &AllocationPlan) {
        for id in &plan.release {
            self.allocations.remove(id);
        }
        for allocation in &plan.create {
            self.allocations.insert(allocation.id, allocation.clone());
        }

        match &plan.payment {
            Some(PaymentChange::Create(payment)) => {
                self.payments.insert(payment.id, payment.clone());
            }
            Some(PaymentChange::Update { payment, expected_version }) => {
                let mut stored = payment.clone();
                stored.version = expected_version + 1;
                self.payments.insert(stored.id, stored);
            }
            Some(PaymentChange::Delete { payment_id, .. }) => {
                self.payments.remove(payment_id);
            }
            None => {}
        }

        for update in &plan.invoice_updates {
            if let Some(invoice) = self.invoices.get_mut(&update.invoice_id) {
                invoice.version += 1;
                if let Some(status) = update.status {
                    invoice.status = status;
                    invoice.updated_at = update.updated_at;
                }
            }
        }
    }
}

impl DomainPort for InMemoryBillingStore {}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        self.read()?
            .invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Invoice", id))
    }

    async fn get_invoices(&self, ids: &[InvoiceId]) -> Result<Vec<Invoice>, PortError> {
        let state = self.read()?;
        Ok(ids.iter().filter_map(|id| state.invoices.get(id).cloned()).collect())
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, PortError> {
        let invoices: Vec<Invoice> = self.read()?.invoices.values().cloned().collect();
        Ok(oldest_first(invoices, |i| (i.created_at, i.id)))
    }

    async fn invoices_for_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, PortError> {
        let invoices: Vec<Invoice> = self
            .read()?
            .invoices
            .values()
            .filter(|i| i.client_id == client_id)
            .cloned()
            .collect();
        Ok(oldest_first(invoices, |i| (i.created_at, i.id)))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        let mut state = self.write()?;
        if state.invoices.values().any(|i| i.reference == invoice.reference) {
            return Err(PortError::conflict(format!(
                "invoice reference {} already exists",
                invoice.reference
            )));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
        self.read()?
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", id))
    }

    async fn payments_for_client(&self, client_id: ClientId) -> Result<Vec<Payment>, PortError> {
        let payments: Vec<Payment> = self
            .read()?
            .payments
            .values()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect();
        Ok(oldest_first(payments, |p| (p.created_at, p.id)))
    }

    async fn allocations_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAllocation>, PortError> {
        Ok(self
            .read()?
            .allocations
            .values()
            .filter(|a| a.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn allocations_for_invoices(&self, ids: &[InvoiceId]) -> Result<Vec<PaymentAllocation>, PortError> {
        Ok(self
            .read()?
            .allocations
            .values()
            .filter(|a| ids.contains(&a.invoice_id))
            .cloned()
            .collect())
    }

    async fn allocations_for_client(&self, client_id: ClientId) -> Result<Vec<PaymentAllocation>, PortError> {
        let state = self.read()?;
        Ok(state
            .allocations
            .values()
            .filter(|a| {
                state
                    .payments
                    .get(&a.payment_id)
                    .is_some_and(|p| p.client_id == client_id)
            })
            .cloned()
            .collect())
    }

    async fn commit(&self, plan: &AllocationPlan) -> Result<(), PortError> {
        let mut state = self.write()?;
        state.validate(plan)?;
        state.apply(plan);
        Ok(())
    }
}

#[async_trait]
impl ReferenceRegistry for InMemoryBillingStore {
    async fn reference_exists(&self, kind: ReferenceKind, reference: &str) -> Result<bool, PortError> {
        let state = self.read()?;
        Ok(match kind {
            ReferenceKind::Invoice => state.invoices.values().any(|i| i.reference == reference),
            ReferenceKind::Payment => state.payments.values().any(|p| p.reference == reference),
            ReferenceKind::Leave(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::InvoiceUpdate;
    use chrono::Utc;
    use core_kernel::{LeaveType, Money};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_stale_invoice_version_rejects_whole_plan() {
        let store = InMemoryBillingStore::new();
        let client = ClientId::new();
        let invoice = Invoice::new("INV-1", client, LeaveType::Sick, "SL1", Money::new(dec!(100))).unwrap();
        store.insert_invoice(&invoice).await.unwrap();

        let payment = Payment::new("PAY-1", client, Money::new(dec!(50))).unwrap();
        let allocation = PaymentAllocation::new(payment.id, invoice.id, Money::new(dec!(50)), Utc::now());
        let plan = AllocationPlan {
            payment: Some(PaymentChange::Create(payment.clone())),
            create: vec![allocation],
            invoice_updates: vec![InvoiceUpdate {
                invoice_id: invoice.id,
                expected_version: invoice.version + 7,
                status: None,
                updated_at: Utc::now(),
            }],
            ..Default::default()
        };

        let err = store.commit(&plan).await.unwrap_err();
        assert!(err.is_stale());
        assert!(store.all_allocations().unwrap().is_empty());
        assert!(store.get_payment(payment.id).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_invoice_reference_conflicts() {
        let store = InMemoryBillingStore::new();
        let client = ClientId::new();
        let first = Invoice::new("INV-1", client, LeaveType::Sick, "SL1", Money::zero()).unwrap();
        let second = Invoice::new("INV-1", client, LeaveType::Sick, "SL2", Money::zero()).unwrap();

        store.insert_invoice(&first).await.unwrap();
        assert!(store.insert_invoice(&second).await.unwrap_err().is_conflict());
        assert!(store.reference_exists(ReferenceKind::Invoice, "INV-1").await.unwrap());
        assert!(!store.reference_exists(ReferenceKind::Payment, "INV-1").await.unwrap());
    }
}
