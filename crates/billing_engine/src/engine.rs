//! The billing engine facade
//!
//! Controllers talk to [`BillingEngine`] only. It wires the price resolver,
//! leave service, invoice service, payment allocator and client ledger to
//! one set of ports, and holds no state of its own beyond those handles.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument};

use core_kernel::{
    ClientId, ClinicClock, Clock, InvoiceId, LeaveId, LeaveType, Money, PaymentId, PriceTierId,
    ReferenceGenerator, ReferenceRegistry, StatusChange,
};
use domain_billing::{
    AllocationOutcome, AllocationTarget, BillingStore, ClientLedger, InMemoryBillingStore, Invoice,
    InvoiceBalance, InvoiceRefreshReport, InvoiceService, InvoiceStatus, LedgerSummary, PaymentAllocator,
};
use domain_leave::{InMemoryLeaveRepository, LeaveRecord, LeaveRefreshReport, LeaveRepository, LeaveService, LeaveStatus};
use domain_pricing::{InMemoryPriceTable, PriceResolver, PriceTier, PriceTierRepository, ResolvedPrice};
use infra_db::{create_pool, run_migrations, DatabasePool, PostgresBillingStore, PostgresLeaveRepository, PostgresPriceTable};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// The storage the engine runs against
///
/// The billing and leave stores double as the reference registries for the
/// numbers they hold.
#[derive(Clone)]
pub struct EnginePorts {
    pub tiers: Arc<dyn PriceTierRepository>,
    pub leaves: Arc<dyn LeaveRepository>,
    pub leave_references: Arc<dyn ReferenceRegistry>,
    pub billing: Arc<dyn BillingStore>,
    pub billing_references: Arc<dyn ReferenceRegistry>,
}

impl EnginePorts {
    /// Fresh in-memory adapters
    pub fn in_memory() -> Self {
        let leaves = Arc::new(InMemoryLeaveRepository::new());
        let billing = Arc::new(InMemoryBillingStore::new());
        Self {
            tiers: Arc::new(InMemoryPriceTable::new()),
            leaves: leaves.clone(),
            leave_references: leaves,
            billing: billing.clone(),
            billing_references: billing,
        }
    }

    /// PostgreSQL adapters sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        let leaves = Arc::new(PostgresLeaveRepository::new(pool.clone()));
        let billing = Arc::new(PostgresBillingStore::new(pool.clone()));
        Self {
            tiers: Arc::new(PostgresPriceTable::new(pool)),
            leaves: leaves.clone(),
            leave_references: leaves,
            billing: billing.clone(),
            billing_references: billing,
        }
    }
}

/// Tunables taken from [`EngineConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_allocation_attempts: u32,
    pub reference_max_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_allocation_attempts: domain_billing::DEFAULT_MAX_ATTEMPTS,
            reference_max_attempts: core_kernel::reference::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_allocation_attempts: config.max_allocation_attempts,
            reference_max_attempts: config.reference_max_attempts,
        }
    }
}

/// Outcome of one maintenance run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub leaves: LeaveRefreshReport,
    pub invoices: InvoiceRefreshReport,
}

pub struct BillingEngine {
    tiers: Arc<dyn PriceTierRepository>,
    prices: PriceResolver,
    leaves: LeaveService,
    invoices: InvoiceService,
    allocator: PaymentAllocator,
    ledger: ClientLedger,
}

impl BillingEngine {
    pub fn new(ports: EnginePorts, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        let leave_references = ReferenceGenerator::new(ports.leave_references, clock.clone())
            .with_max_attempts(settings.reference_max_attempts);
        let billing_references = ReferenceGenerator::new(ports.billing_references, clock.clone())
            .with_max_attempts(settings.reference_max_attempts);

        Self {
            prices: PriceResolver::new(ports.tiers.clone()),
            tiers: ports.tiers,
            leaves: LeaveService::new(ports.leaves, leave_references, clock.clone()),
            invoices: InvoiceService::new(ports.billing.clone(), billing_references.clone(), clock.clone())
                .with_max_attempts(settings.max_allocation_attempts),
            allocator: PaymentAllocator::new(ports.billing.clone(), billing_references, clock)
                .with_max_attempts(settings.max_allocation_attempts),
            ledger: ClientLedger::new(ports.billing),
        }
    }

    /// An engine over fresh in-memory stores
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(EnginePorts::in_memory(), clock, EngineSettings::default())
    }

    /// Connects to PostgreSQL, applies migrations and builds the engine
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded settings; validated before any connection is made
    ///
    /// # Returns
    ///
    /// The engine over PostgreSQL ports with a clock in the clinic's
    /// timezone, and the pool, so the caller controls its lifetime.
    ///
    /// # Errors
    ///
    /// `Config` for invalid settings or an unknown timezone, `Database` if
    /// the pool cannot connect or a migration fails.
    pub async fn connect(config: &EngineConfig) -> Result<(Self, DatabasePool), EngineError> {
        config.validate()?;
        let pool = create_pool(config.database()).await?;
        run_migrations(&pool).await?;

        let clock: Arc<dyn Clock> = Arc::new(ClinicClock::new(config.clinic_timezone()?));
        let engine = Self::new(EnginePorts::postgres(pool.clone()), clock, EngineSettings::from(config));
        Ok((engine, pool))
    }

    // ------------------------------------------------------------------
    // Pricing
    // ------------------------------------------------------------------

    /// Price of a leave per the tier waterfall
    ///
    /// `NoPriceFound` is returned as an error, never as zero.
    pub async fn resolve_price(
        &self,
        leave_type: LeaveType,
        duration_days: i64,
        client_id: Option<ClientId>,
    ) -> Result<Money, EngineError> {
        Ok(self.prices.resolve(leave_type, duration_days, client_id).await?)
    }

    /// Price together with the waterfall step and tier that produced it
    pub async fn resolve_price_detailed(
        &self,
        leave_type: LeaveType,
        duration_days: i64,
        client_id: Option<ClientId>,
    ) -> Result<ResolvedPrice, EngineError> {
        Ok(self.prices.resolve_detailed(leave_type, duration_days, client_id).await?)
    }

    /// Stores a tier; a second active tier for the same key is a conflict
    pub async fn save_price_tier(&self, tier: &PriceTier) -> Result<(), EngineError> {
        self.tiers.save(tier).await.map_err(domain_pricing::PricingError::from)?;
        Ok(())
    }

    /// Takes a tier out of resolution without deleting it
    #[instrument(skip(self))]
    pub async fn deactivate_price_tier(&self, id: PriceTierId) -> Result<PriceTier, EngineError> {
        let mut tier = self.tiers.get(id).await.map_err(domain_pricing::PricingError::from)?;
        if tier.active {
            tier.deactivate();
            self.tiers.save(&tier).await.map_err(domain_pricing::PricingError::from)?;
            info!(tier_id = %id, "price tier deactivated");
        }
        Ok(tier)
    }

    // ------------------------------------------------------------------
    // Leave records
    // ------------------------------------------------------------------

    pub async fn register_leave(
        &self,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<LeaveRecord, EngineError> {
        Ok(self.leaves.register(leave_type, start_date, end_date).await?)
    }

    pub async fn get_leave(&self, id: LeaveId) -> Result<LeaveRecord, EngineError> {
        Ok(self.leaves.get(id).await?)
    }

    pub async fn reschedule_leave(
        &self,
        id: LeaveId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<LeaveRecord, EngineError> {
        Ok(self.leaves.reschedule(id, start_date, end_date).await?)
    }

    pub async fn cancel_leave(&self, id: LeaveId) -> Result<LeaveRecord, EngineError> {
        Ok(self.leaves.cancel(id).await?)
    }

    pub async fn delete_leave(&self, id: LeaveId) -> Result<(), EngineError> {
        Ok(self.leaves.delete(id).await?)
    }

    pub async fn refresh_leave_status(&self, id: LeaveId) -> Result<StatusChange<LeaveStatus>, EngineError> {
        Ok(self.leaves.refresh_status(id).await?)
    }

    /// The idempotent "refresh all leave statuses" sweep
    pub async fn refresh_leave_statuses(&self) -> Result<LeaveRefreshReport, EngineError> {
        Ok(self.leaves.refresh_all().await?)
    }

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    /// Issues an invoice for an amount the caller already settled on
    pub async fn create_invoice(
        &self,
        leave_type: LeaveType,
        leave_reference: &str,
        client_id: ClientId,
        amount: Money,
    ) -> Result<Invoice, EngineError> {
        Ok(self
            .invoices
            .create_invoice(client_id, leave_type, leave_reference, amount)
            .await?)
    }

    /// Prices a registered leave and invoices it
    ///
    /// A missing price blocks the invoice: `NoPriceFound` is returned and
    /// nothing is created.
    #[instrument(skip(self))]
    pub async fn invoice_leave(&self, leave_id: LeaveId, client_id: ClientId) -> Result<Invoice, EngineError> {
        let leave = self.leaves.get(leave_id).await?;
        let price = self
            .prices
            .resolve(leave.leave_type, i64::from(leave.duration_days), Some(client_id))
            .await?;

        self.create_invoice(leave.leave_type, &leave.reference, client_id, price)
            .await
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, EngineError> {
        Ok(self.invoices.get_invoice(id).await?)
    }

    /// Invoice with its allocated total
    pub async fn invoice_balance(&self, id: InvoiceId) -> Result<InvoiceBalance, EngineError> {
        Ok(self.invoices.invoice_balance(id).await?)
    }

    pub async fn cancel_invoice(&self, id: InvoiceId) -> Result<Invoice, EngineError> {
        Ok(self.invoices.cancel_invoice(id).await?)
    }

    /// Re-derives an invoice's status before it is shown
    pub async fn refresh_invoice_status(&self, id: InvoiceId) -> Result<StatusChange<InvoiceStatus>, EngineError> {
        Ok(self.invoices.refresh_invoice_status(id).await?)
    }

    pub async fn refresh_all_invoice_statuses(&self) -> Result<InvoiceRefreshReport, EngineError> {
        Ok(self.invoices.refresh_all().await?)
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    pub async fn record_payment(
        &self,
        client_id: ClientId,
        amount: Money,
        targets: &[AllocationTarget],
    ) -> Result<AllocationOutcome, EngineError> {
        Ok(self.allocator.record_payment(client_id, amount, targets).await?)
    }

    pub async fn allocate_payment(
        &self,
        payment_id: PaymentId,
        targets: &[AllocationTarget],
    ) -> Result<AllocationOutcome, EngineError> {
        Ok(self.allocator.allocate(payment_id, targets).await?)
    }

    pub async fn reallocate_payment(
        &self,
        payment_id: PaymentId,
        targets: &[AllocationTarget],
    ) -> Result<AllocationOutcome, EngineError> {
        Ok(self.allocator.reallocate(payment_id, targets).await?)
    }

    pub async fn deallocate_payment(&self, payment_id: PaymentId) -> Result<AllocationOutcome, EngineError> {
        Ok(self.allocator.deallocate(payment_id).await?)
    }

    pub async fn delete_payment(&self, payment_id: PaymentId) -> Result<AllocationOutcome, EngineError> {
        Ok(self.allocator.delete_payment(payment_id).await?)
    }

    pub async fn update_payment_amount(
        &self,
        payment_id: PaymentId,
        amount: Money,
    ) -> Result<AllocationOutcome, EngineError> {
        Ok(self.allocator.update_payment_amount(payment_id, amount).await?)
    }

    /// Payment money still free for other invoices
    pub async fn unallocated_amount(&self, payment_id: PaymentId) -> Result<Money, EngineError> {
        Ok(self.allocator.unallocated(payment_id).await?)
    }

    // ------------------------------------------------------------------
    // Ledger and maintenance
    // ------------------------------------------------------------------

    pub async fn get_client_balance(&self, client_id: ClientId) -> Result<Money, EngineError> {
        Ok(self.ledger.balance(client_id).await?)
    }

    pub async fn client_summary(&self, client_id: ClientId) -> Result<LedgerSummary, EngineError> {
        Ok(self.ledger.summary(client_id).await?)
    }

    /// Runs both status sweeps, leaves first
    #[instrument(skip(self))]
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, EngineError> {
        let leaves = self.refresh_leave_statuses().await?;
        let invoices = self.refresh_all_invoice_statuses().await?;
        Ok(MaintenanceReport { leaves, invoices })
    }
}
