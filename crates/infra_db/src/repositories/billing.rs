//! Billing repository implementation
//!
//! Invoices, payments and payment allocations. Single-row reads run against
//! the pool; [`BillingRepository::commit`] applies an allocation plan inside
//! one transaction.
//!
//! # Commit protocol
//!
//! 1. Lock the payment row and every invoice row named in the plan with
//!    `SELECT ... FOR UPDATE`, invoices in id order so two commits never
//!    wait on each other in opposite order
//! 2. Compare each locked version with the version the plan was built from;
//!    any difference aborts the transaction with `StaleVersion`
//! 3. Release allocations, write the payment, create allocations, then bump
//!    every invoice's version and set the statuses that changed

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use core_kernel::{ClientId, LeaveType, Money, PaymentId};
use domain_billing::{AllocationPlan, Invoice, InvoiceStatus, Payment, PaymentAllocation, PaymentChange};

use crate::error::DatabaseError;

const INVOICE_COLUMNS: &str =
    "id, reference, client_id, leave_type, leave_reference, amount, status, version, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, reference, client_id, amount, version, created_at, updated_at";
const ALLOCATION_COLUMNS: &str = "id, payment_id, invoice_id, amount, allocated_at";

/// Database row for the `invoices` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub reference: String,
    pub client_id: Uuid,
    pub leave_type: String,
    pub leave_reference: String,
    pub amount: Decimal,
    pub status: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DatabaseError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let leave_type: LeaveType = row
            .leave_type
            .parse()
            .map_err(|e: core_kernel::CoreError| DatabaseError::corrupt(e.to_string()))?;
        let status = InvoiceStatus::from_code(&row.status)
            .ok_or_else(|| DatabaseError::corrupt(format!("unknown invoice status '{}'", row.status)))?;

        Ok(Invoice {
            id: row.id.into(),
            reference: row.reference,
            client_id: ClientId::from(row.client_id),
            leave_type,
            leave_reference: row.leave_reference,
            amount: Money::new(row.amount),
            status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for the `payments` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub reference: String,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.id.into(),
            reference: row.reference,
            client_id: ClientId::from(row.client_id),
            amount: Money::new(row.amount),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database row for the `payment_allocations` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AllocationRow {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub allocated_at: DateTime<Utc>,
}

impl From<AllocationRow> for PaymentAllocation {
    fn from(row: AllocationRow) -> Self {
        PaymentAllocation {
            id: row.id.into(),
            payment_id: row.payment_id.into(),
            invoice_id: row.invoice_id.into(),
            amount: Money::new(row.amount),
            allocated_at: row.allocated_at,
        }
    }
}

/// Repository for invoices, payments and their allocations
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    pub async fn get_invoice(&self, id: Uuid) -> Result<InvoiceRow, DatabaseError> {
        sqlx::query_as::<_, InvoiceRow>(&format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Invoice", id))
    }

    pub async fn get_invoices(&self, ids: &[Uuid]) -> Result<Vec<InvoiceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = ANY($1) ORDER BY created_at, id",
            INVOICE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_invoices(&self) -> Result<Vec<InvoiceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices ORDER BY created_at, id",
            INVOICE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn invoices_for_client(&self, client_id: Uuid) -> Result<Vec<InvoiceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE client_id = $1 ORDER BY created_at, id",
            INVOICE_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, reference, client_id, leave_type, leave_reference,
                amount, status, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::from(invoice.id))
        .bind(&invoice.reference)
        .bind(Uuid::from(invoice.client_id))
        .bind(invoice.leave_type.code())
        .bind(&invoice.leave_reference)
        .bind(invoice.amount.amount())
        .bind(invoice.status.code())
        .bind(invoice.version)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Payments and allocations
    // ------------------------------------------------------------------

    pub async fn get_payment(&self, id: Uuid) -> Result<PaymentRow, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(&format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Payment", id))
    }

    pub async fn payments_for_client(&self, client_id: Uuid) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE client_id = $1 ORDER BY created_at, id",
            PAYMENT_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn allocations_for_payment(&self, payment_id: Uuid) -> Result<Vec<AllocationRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {} FROM payment_allocations WHERE payment_id = $1 ORDER BY allocated_at, id",
            ALLOCATION_COLUMNS
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn allocations_for_invoices(&self, invoice_ids: &[Uuid]) -> Result<Vec<AllocationRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {} FROM payment_allocations WHERE invoice_id = ANY($1) ORDER BY allocated_at, id",
            ALLOCATION_COLUMNS
        ))
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn allocations_for_client(&self, client_id: Uuid) -> Result<Vec<AllocationRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT a.id, a.payment_id, a.invoice_id, a.amount, a.allocated_at
            FROM payment_allocations a
            JOIN payments p ON p.id = a.payment_id
            WHERE p.client_id = $1
            ORDER BY a.allocated_at, a.id
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn reference_exists(&self, table: ReferenceTable, reference: &str) -> Result<bool, DatabaseError> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE reference = $1)",
            table.name()
        ))
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Applies an allocation plan atomically
    ///
    /// # Errors
    ///
    /// `StaleVersion` if any payment or invoice changed since the plan was
    /// read, `NotFound` if one of them no longer exists, `DuplicateEntry`
    /// for a clashing payment reference. Nothing is written in any of these
    /// cases.
    pub async fn commit(&self, plan: &AllocationPlan) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        match &plan.payment {
            Some(PaymentChange::Update { payment, expected_version }) => {
                lock_payment(&mut tx, payment.id, *expected_version).await?;
            }
            Some(PaymentChange::Delete { payment_id, expected_version }) => {
                lock_payment(&mut tx, *payment_id, *expected_version).await?;
            }
            _ => {}
        }
        lock_invoices(&mut tx, plan).await?;

        if !plan.release.is_empty() {
            let ids: Vec<Uuid> = plan.release.iter().map(|id| Uuid::from(*id)).collect();
            sqlx::query("DELETE FROM payment_allocations WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?;
        }

        match &plan.payment {
            Some(PaymentChange::Create(payment)) => {
                sqlx::query(
                    r#"
                    INSERT INTO payments (id, reference, client_id, amount, version, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(Uuid::from(payment.id))
                .bind(&payment.reference)
                .bind(Uuid::from(payment.client_id))
                .bind(payment.amount.amount())
                .bind(payment.version)
                .bind(payment.created_at)
                .bind(payment.updated_at)
                .execute(&mut *tx)
                .await?;
            }
            Some(PaymentChange::Update { payment, .. }) => {
                sqlx::query(
                    "UPDATE payments SET amount = $2, updated_at = $3, version = version + 1 WHERE id = $1",
                )
                .bind(Uuid::from(payment.id))
                .bind(payment.amount.amount())
                .bind(payment.updated_at)
                .execute(&mut *tx)
                .await?;
            }
            _ => {}
        }

        for allocation in &plan.create {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (id, payment_id, invoice_id, amount, allocated_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::from(allocation.id))
            .bind(Uuid::from(allocation.payment_id))
            .bind(Uuid::from(allocation.invoice_id))
            .bind(allocation.amount.amount())
            .bind(allocation.allocated_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(PaymentChange::Delete { payment_id, .. }) = &plan.payment {
            sqlx::query("DELETE FROM payments WHERE id = $1")
                .bind(Uuid::from(*payment_id))
                .execute(&mut *tx)
                .await?;
        }

        for update in &plan.invoice_updates {
            sqlx::query(
                r#"
                UPDATE invoices SET
                    version = version + 1,
                    status = COALESCE($2, status),
                    updated_at = CASE WHEN $2::TEXT IS NULL THEN updated_at ELSE $3 END
                WHERE id = $1
                "#,
            )
            .bind(Uuid::from(update.invoice_id))
            .bind(update.status.map(|s| s.code()))
            .bind(update.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            released = plan.release.len(),
            created = plan.create.len(),
            invoices = plan.invoice_updates.len(),
            "allocation plan committed"
        );
        Ok(())
    }
}

/// Tables carrying a unique `reference` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTable {
    Invoices,
    Payments,
}

impl ReferenceTable {
    fn name(&self) -> &'static str {
        match self {
            ReferenceTable::Invoices => "invoices",
            ReferenceTable::Payments => "payments",
        }
    }
}

async fn lock_payment(
    tx: &mut Transaction<'_, Postgres>,
    id: PaymentId,
    expected_version: i64,
) -> Result<(), DatabaseError> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM payments WHERE id = $1 FOR UPDATE")
        .bind(Uuid::from(id))
        .fetch_optional(&mut **tx)
        .await?;

    match version {
        None => Err(DatabaseError::not_found("Payment", id)),
        Some(v) if v != expected_version => Err(DatabaseError::stale("Payment", id)),
        Some(_) => Ok(()),
    }
}

async fn lock_invoices(tx: &mut Transaction<'_, Postgres>, plan: &AllocationPlan) -> Result<(), DatabaseError> {
    if plan.invoice_updates.is_empty() {
        return Ok(());
    }

    let mut ids: Vec<Uuid> = plan.invoice_updates.iter().map(|u| Uuid::from(u.invoice_id)).collect();
    ids.sort();
    ids.dedup();

    let locked: Vec<(Uuid, i64)> =
        sqlx::query_as("SELECT id, version FROM invoices WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut **tx)
            .await?;

    for update in &plan.invoice_updates {
        let id = Uuid::from(update.invoice_id);
        match locked.iter().find(|(locked_id, _)| *locked_id == id) {
            None => return Err(DatabaseError::not_found("Invoice", update.invoice_id)),
            Some((_, version)) if *version != update.expected_version => {
                return Err(DatabaseError::stale("Invoice", update.invoice_id));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_invoice_row_maps_status() {
        let row = InvoiceRow {
            id: Uuid::new_v4(),
            reference: "INV-20240105-00001".to_string(),
            client_id: Uuid::new_v4(),
            leave_type: "companion".to_string(),
            leave_reference: "CL2024010501".to_string(),
            amount: dec!(1000),
            status: "partially_paid".to_string(),
            version: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let invoice = Invoice::try_from(row).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.leave_type, LeaveType::Companion);
        assert_eq!(invoice.version, 4);
    }

    #[test]
    fn test_unknown_invoice_status_is_corrupt() {
        let row = InvoiceRow {
            id: Uuid::new_v4(),
            reference: "INV-1".to_string(),
            client_id: Uuid::new_v4(),
            leave_type: "sick".to_string(),
            leave_reference: "SL1".to_string(),
            amount: dec!(10),
            status: "refunded".to_string(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(matches!(Invoice::try_from(row), Err(DatabaseError::CorruptRow(_))));
    }
}
