//! Leave records and their status machine
//!
//! ```text
//!            end_date < today
//!   Active ───────────────────▶ Expired
//!     ▲                            │
//!     └────── end_date >= today ───┘
//!
//!   Active / Expired ── cancel() ──▶ Cancelled   (terminal for refreshes)
//! ```
//!
//! `duration_days` is always `(end_date - start_date) + 1`; both endpoints
//! count. Records with `end_date < start_date` cannot be built.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{DateRange, LeaveId, LeaveType, StatusChange};

use crate::error::LeaveError;

/// Lifecycle status of a leave record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Active,
    Expired,
    /// Set only by an explicit command; refreshes never leave this state
    Cancelled,
}

impl LeaveStatus {
    pub fn code(&self) -> &'static str {
        match self {
            LeaveStatus::Active => "active",
            LeaveStatus::Expired => "expired",
            LeaveStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(LeaveStatus::Active),
            "expired" => Some(LeaveStatus::Expired),
            "cancelled" => Some(LeaveStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Derives the next status of a leave from its dates
///
/// `Cancelled` is returned unchanged; otherwise the leave is `Expired` once
/// its last day is before `today`.
pub fn derive_leave_status(current: LeaveStatus, end_date: NaiveDate, today: NaiveDate) -> LeaveStatus {
    if current == LeaveStatus::Cancelled {
        return current;
    }
    if end_date < today {
        LeaveStatus::Expired
    } else {
        LeaveStatus::Active
    }
}

/// A sick or companion leave issued by the clinic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRecord {
    pub id: LeaveId,
    /// Business reference printed on the certificate (e.g. `SL2024010501`)
    pub reference: String,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: u32,
    pub status: LeaveStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRecord {
    /// Creates a leave record with derived duration and status
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `end_date < start_date` or the reference is blank.
    pub fn new(
        reference: impl Into<String>,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, LeaveError> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(LeaveError::invalid_input("leave reference must not be blank"));
        }
        let period = DateRange::new(start_date, end_date)?;
        let now = Utc::now();

        Ok(Self {
            id: LeaveId::new_v7(),
            reference,
            leave_type,
            start_date,
            end_date,
            duration_days: period.inclusive_days(),
            status: derive_leave_status(LeaveStatus::Active, end_date, today),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn period(&self) -> Result<DateRange, LeaveError> {
        Ok(DateRange::new(self.start_date, self.end_date)?)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == LeaveStatus::Cancelled
    }

    /// Changes the leave dates, re-deriving duration and status
    ///
    /// # Errors
    ///
    /// `InvalidInput` for inverted dates; the record is left untouched.
    pub fn reschedule(
        &mut self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<StatusChange<LeaveStatus>, LeaveError> {
        let period = DateRange::new(start_date, end_date)?;

        self.start_date = start_date;
        self.end_date = end_date;
        self.duration_days = period.inclusive_days();
        self.updated_at = Utc::now();

        Ok(self.apply_status(derive_leave_status(self.status, end_date, today)))
    }

    /// Cancels the leave; cancelling twice is a no-op
    pub fn cancel(&mut self) -> StatusChange<LeaveStatus> {
        self.apply_status(LeaveStatus::Cancelled)
    }

    /// Re-derives the status for `today`
    ///
    /// Only a real transition touches `updated_at`, so repeated refreshes on
    /// the same day produce identical records.
    pub fn refresh_status(&mut self, today: NaiveDate) -> StatusChange<LeaveStatus> {
        self.apply_status(derive_leave_status(self.status, self.end_date, today))
    }

    fn apply_status(&mut self, next: LeaveStatus) -> StatusChange<LeaveStatus> {
        let change = StatusChange::between(self.status, next);
        if change.is_changed() {
            self.status = next;
            self.updated_at = Utc::now();
        }
        change
    }
}
