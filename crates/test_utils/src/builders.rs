//! Test Data Builders
//!
//! Builders for invoices and leave records with sensible defaults, so
//! tests only spell out the fields they care about.

use chrono::NaiveDate;
use core_kernel::{ClientId, LeaveType, Money};
use domain_billing::{Invoice, InvoiceStatus};
use domain_leave::LeaveRecord;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::fixtures::DateFixtures;

fn unique_reference(prefix: &str) -> String {
    format!("{}-TEST-{}", prefix, Uuid::new_v4().simple())
}

/// Builder for invoices
///
/// Defaults to an unpaid sick-leave invoice of 1000 for a fresh client.
pub struct InvoiceBuilder {
    reference: String,
    client_id: ClientId,
    leave_type: LeaveType,
    leave_reference: String,
    amount: Money,
    status: InvoiceStatus,
}

impl Default for InvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceBuilder {
    pub fn new() -> Self {
        Self {
            reference: unique_reference("INV"),
            client_id: ClientId::new(),
            leave_type: LeaveType::Sick,
            leave_reference: unique_reference("SL"),
            amount: Money::new(dec!(1000)),
            status: InvoiceStatus::Unpaid,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_leave_type(mut self, leave_type: LeaveType) -> Self {
        self.leave_type = leave_type;
        self
    }

    pub fn with_leave_reference(mut self, leave_reference: impl Into<String>) -> Self {
        self.leave_reference = leave_reference.into();
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    /// Stored status, bypassing derivation
    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    /// Builds the invoice
    ///
    /// # Panics
    ///
    /// Panics if the configured fields are invalid
    pub fn build(self) -> Invoice {
        let mut invoice = Invoice::new(
            self.reference,
            self.client_id,
            self.leave_type,
            self.leave_reference,
            self.amount,
        )
        .expect("InvoiceBuilder produced an invalid invoice");
        invoice.status = self.status;
        invoice
    }
}

/// Builder for leave records
///
/// Status is derived against `today`, which defaults to
/// [`DateFixtures::today`].
pub struct LeaveRecordBuilder {
    reference: String,
    leave_type: LeaveType,
    start_date: NaiveDate,
    end_date: NaiveDate,
    today: NaiveDate,
}

impl Default for LeaveRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaveRecordBuilder {
    pub fn new() -> Self {
        let (start_date, end_date) = DateFixtures::current_leave();
        Self {
            reference: unique_reference("SL"),
            leave_type: LeaveType::Sick,
            start_date,
            end_date,
            today: DateFixtures::today(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_leave_type(mut self, leave_type: LeaveType) -> Self {
        self.leave_type = leave_type;
        self
    }

    pub fn with_period(mut self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn build(self) -> LeaveRecord {
        LeaveRecord::new(
            self.reference,
            self.leave_type,
            self.start_date,
            self.end_date,
            self.today,
        )
        .expect("LeaveRecordBuilder produced an invalid leave record")
    }
}
