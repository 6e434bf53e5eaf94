//! PostgreSQL billing store

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{ClientId, DomainPort, InvoiceId, PaymentId, PortError, ReferenceKind, ReferenceRegistry};
use domain_billing::{AllocationPlan, BillingStore, Invoice, Payment, PaymentAllocation};

use crate::error::DatabaseError;
use crate::repositories::{AllocationRow, BillingRepository, InvoiceRow, ReferenceTable};

/// `BillingStore` backed by the `invoices`, `payments` and
/// `payment_allocations` tables
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    repository: BillingRepository,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool),
        }
    }
}

fn invoices(rows: Vec<InvoiceRow>) -> Result<Vec<Invoice>, PortError> {
    rows.into_iter()
        .map(|row| Invoice::try_from(row).map_err(PortError::from))
        .collect()
}

fn allocations(rows: Vec<AllocationRow>) -> Vec<PaymentAllocation> {
    rows.into_iter().map(PaymentAllocation::from).collect()
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        let row = self.repository.get_invoice(Uuid::from(id)).await?;
        Ok(Invoice::try_from(row)?)
    }

    async fn get_invoices(&self, ids: &[InvoiceId]) -> Result<Vec<Invoice>, PortError> {
        invoices(self.repository.get_invoices(&uuids(ids)).await?)
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, PortError> {
        invoices(self.repository.list_invoices().await?)
    }

    async fn invoices_for_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, PortError> {
        invoices(self.repository.invoices_for_client(Uuid::from(client_id)).await?)
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        self.repository.insert_invoice(invoice).await.map_err(|e| match e {
            DatabaseError::DuplicateEntry(_) => {
                PortError::conflict(format!("invoice reference {} already exists", invoice.reference))
            }
            other => other.into(),
        })
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
        Ok(self.repository.get_payment(Uuid::from(id)).await?.into())
    }

    async fn payments_for_client(&self, client_id: ClientId) -> Result<Vec<Payment>, PortError> {
        let rows = self.repository.payments_for_client(Uuid::from(client_id)).await?;
        Ok(rows.into_iter().map(Payment::from).collect())
    }

    async fn allocations_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAllocation>, PortError> {
        Ok(allocations(self.repository.allocations_for_payment(Uuid::from(payment_id)).await?))
    }

    async fn allocations_for_invoices(&self, ids: &[InvoiceId]) -> Result<Vec<PaymentAllocation>, PortError> {
        Ok(allocations(self.repository.allocations_for_invoices(&uuids(ids)).await?))
    }

    async fn allocations_for_client(&self, client_id: ClientId) -> Result<Vec<PaymentAllocation>, PortError> {
        Ok(allocations(self.repository.allocations_for_client(Uuid::from(client_id)).await?))
    }

    #[instrument(skip(self, plan), fields(creates = plan.create.len(), releases = plan.release.len()))]
    async fn commit(&self, plan: &AllocationPlan) -> Result<(), PortError> {
        Ok(self.repository.commit(plan).await?)
    }
}

#[async_trait]
impl ReferenceRegistry for PostgresBillingStore {
    async fn reference_exists(&self, kind: ReferenceKind, reference: &str) -> Result<bool, PortError> {
        let table = match kind {
            ReferenceKind::Invoice => ReferenceTable::Invoices,
            ReferenceKind::Payment => ReferenceTable::Payments,
            ReferenceKind::Leave(_) => return Ok(false),
        };
        Ok(self.repository.reference_exists(table, reference).await?)
    }
}
