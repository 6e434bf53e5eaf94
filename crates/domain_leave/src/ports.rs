//! Leave Domain Ports
//!
//! The leave repository is implemented in memory here and against
//! PostgreSQL in `infra_db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{DomainPort, LeaveId, PortError};

use crate::record::{LeaveRecord, LeaveStatus};

/// A status-only write produced by a refresh or a cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveStatusUpdate {
    pub id: LeaveId,
    pub status: LeaveStatus,
    pub updated_at: DateTime<Utc>,
}

/// Storage of leave records
#[async_trait]
pub trait LeaveRepository: DomainPort {
    /// Retrieves a record by id, or `PortError::NotFound`
    async fn get(&self, id: LeaveId) -> Result<LeaveRecord, PortError>;

    /// Inserts a new record; duplicate references are a `Conflict`
    async fn insert(&self, record: &LeaveRecord) -> Result<(), PortError>;

    /// Replaces a stored record
    ///
    /// A stored `Cancelled` status is never replaced by another status; such
    /// a write fails with `PortError::Stale` and changes nothing.
    async fn update(&self, record: &LeaveRecord) -> Result<(), PortError>;

    /// Writes one record's status under the same cancel guard as
    /// [`apply_status_updates`](Self::apply_status_updates)
    ///
    /// Returns `false` when the stored record was already `Cancelled` and the
    /// write was skipped.
    async fn update_status(&self, update: &LeaveStatusUpdate) -> Result<bool, PortError>;

    /// Removes a record. Invoices referencing it are unaffected.
    async fn delete(&self, id: LeaveId) -> Result<(), PortError>;

    /// All records, oldest first
    async fn list(&self) -> Result<Vec<LeaveRecord>, PortError>;

    /// Applies a batch of status writes atomically
    ///
    /// Rows that became `Cancelled` after the sweep read them must be left
    /// alone, so a concurrent cancel always wins over a refresh.
    async fn apply_status_updates(&self, updates: &[LeaveStatusUpdate]) -> Result<(), PortError>;
}
