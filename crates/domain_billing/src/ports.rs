//! Billing Domain Ports

use async_trait::async_trait;

use core_kernel::{ClientId, DomainPort, InvoiceId, PaymentId, PortError};

use crate::invoice::Invoice;
use crate::payment::{Payment, PaymentAllocation};
use crate::plan::AllocationPlan;

/// Storage of invoices, payments and allocations
///
/// Reads may come from a snapshot. All writes that span more than one row go
/// through [`commit`](BillingStore::commit).
#[async_trait]
pub trait BillingStore: DomainPort {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// The listed invoices that exist; missing ids are skipped
    async fn get_invoices(&self, ids: &[InvoiceId]) -> Result<Vec<Invoice>, PortError>;

    async fn list_invoices(&self) -> Result<Vec<Invoice>, PortError>;

    async fn invoices_for_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, PortError>;

    /// Inserts a new invoice; duplicate references are a `Conflict`
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError>;

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError>;

    async fn payments_for_client(&self, client_id: ClientId) -> Result<Vec<Payment>, PortError>;

    async fn allocations_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAllocation>, PortError>;

    /// Allocations from any payment against the listed invoices
    async fn allocations_for_invoices(&self, ids: &[InvoiceId]) -> Result<Vec<PaymentAllocation>, PortError>;

    /// Allocations made by the client's payments
    async fn allocations_for_client(&self, client_id: ClientId) -> Result<Vec<PaymentAllocation>, PortError>;

    /// Applies a plan atomically
    ///
    /// Every payment and invoice named in the plan must still carry its
    /// expected version, otherwise nothing is written and `PortError::Stale`
    /// is returned. Each of them has its version bumped on success.
    async fn commit(&self, plan: &AllocationPlan) -> Result<(), PortError>;
}
