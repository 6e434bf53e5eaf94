//! Leave application service
//!
//! Wraps the repository with the commands controllers need and the
//! "refresh all leave statuses" sweep.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use core_kernel::{Clock, LeaveId, LeaveType, ReferenceGenerator, ReferenceKind, StatusChange};

use crate::error::LeaveError;
use crate::ports::{LeaveRepository, LeaveStatusUpdate};
use crate::record::{LeaveRecord, LeaveStatus};

/// Summary of a refresh sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRefreshReport {
    /// Records examined
    pub scanned: usize,
    /// Records whose status actually changed
    pub updated: usize,
    /// Of `updated`, transitions into `Expired`
    pub expired: usize,
    /// Of `updated`, transitions back into `Active`
    pub reactivated: usize,
    /// Cancelled records left untouched
    pub cancelled_skipped: usize,
}

pub struct LeaveService {
    leaves: Arc<dyn LeaveRepository>,
    references: ReferenceGenerator,
    clock: Arc<dyn Clock>,
}

impl LeaveService {
    pub fn new(
        leaves: Arc<dyn LeaveRepository>,
        references: ReferenceGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { leaves, references, clock }
    }

    /// Registers a new leave with a fresh reference number
    #[instrument(skip(self))]
    pub async fn register(
        &self,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<LeaveRecord, LeaveError> {
        // Validate before consuming a reference number
        core_kernel::DateRange::new(start_date, end_date)?;

        let reference = self.references.generate(ReferenceKind::Leave(leave_type)).await?;
        let record = LeaveRecord::new(reference, leave_type, start_date, end_date, self.clock.today())?;
        self.leaves.insert(&record).await?;

        info!(leave_id = %record.id, reference = %record.reference, status = %record.status, "leave registered");
        Ok(record)
    }

    pub async fn get(&self, id: LeaveId) -> Result<LeaveRecord, LeaveError> {
        Ok(self.leaves.get(id).await?)
    }

    /// Moves a leave to new dates
    ///
    /// A cancel committed after the read makes the write fail with a stale
    /// `PortError`; the cancelled record is kept as stored.
    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        id: LeaveId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<LeaveRecord, LeaveError> {
        let mut record = self.leaves.get(id).await?;
        let change = record.reschedule(start_date, end_date, self.clock.today())?;
        self.leaves.update(&record).await?;

        log_change(id, change);
        Ok(record)
    }

    /// Cancels a leave; the status is then fixed for all future refreshes
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: LeaveId) -> Result<LeaveRecord, LeaveError> {
        let mut record = self.leaves.get(id).await?;
        let change = record.cancel();
        if change.is_changed() {
            self.leaves.update_status(&status_update(&record)).await?;
        }

        log_change(id, change);
        Ok(record)
    }

    /// Deletes a leave record; invoices keep their reference to it
    pub async fn delete(&self, id: LeaveId) -> Result<(), LeaveError> {
        self.leaves.delete(id).await?;
        info!(leave_id = %id, "leave deleted");
        Ok(())
    }

    /// Re-derives one record's status, writing only on change
    ///
    /// When the record was cancelled after it was read, the write is skipped
    /// and the result reports it as unchanged and `Cancelled`.
    pub async fn refresh_status(&self, id: LeaveId) -> Result<StatusChange<LeaveStatus>, LeaveError> {
        let mut record = self.leaves.get(id).await?;
        let change = record.refresh_status(self.clock.today());
        if change.is_changed() && !self.leaves.update_status(&status_update(&record)).await? {
            info!(leave_id = %id, "leave cancelled concurrently, refresh skipped");
            return Ok(StatusChange::Unchanged(LeaveStatus::Cancelled));
        }
        log_change(id, change);
        Ok(change)
    }

    /// Re-derives every record's status for today
    ///
    /// Idempotent: a second run on the same day finds nothing to update and
    /// performs no writes.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<LeaveRefreshReport, LeaveError> {
        let today = self.clock.today();
        let records = self.leaves.list().await?;

        let mut report = LeaveRefreshReport {
            scanned: records.len(),
            ..Default::default()
        };
        let mut updates = Vec::new();

        for mut record in records {
            if record.is_cancelled() {
                report.cancelled_skipped += 1;
                continue;
            }
            if let StatusChange::Changed { to, .. } = record.refresh_status(today) {
                match to {
                    LeaveStatus::Expired => report.expired += 1,
                    LeaveStatus::Active => report.reactivated += 1,
                    LeaveStatus::Cancelled => {}
                }
                updates.push(status_update(&record));
            }
        }

        report.updated = updates.len();
        if !updates.is_empty() {
            self.leaves.apply_status_updates(&updates).await?;
        }

        info!(
            %today,
            scanned = report.scanned,
            updated = report.updated,
            expired = report.expired,
            reactivated = report.reactivated,
            "leave statuses refreshed"
        );
        Ok(report)
    }
}

fn status_update(record: &LeaveRecord) -> LeaveStatusUpdate {
    LeaveStatusUpdate {
        id: record.id,
        status: record.status,
        updated_at: record.updated_at,
    }
}

fn log_change(id: LeaveId, change: StatusChange<LeaveStatus>) {
    if let StatusChange::Changed { from, to } = change {
        info!(leave_id = %id, %from, %to, "leave status changed");
    }
}
