//! In-memory leave repository

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use core_kernel::{DomainPort, LeaveId, PortError, ReferenceKind, ReferenceRegistry};

use crate::ports::{LeaveRepository, LeaveStatusUpdate};
use crate::record::{LeaveRecord, LeaveStatus};

#[derive(Debug, Default)]
pub struct InMemoryLeaveRepository {
    records: RwLock<BTreeMap<LeaveId, LeaveRecord>>,
}

impl InMemoryLeaveRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<LeaveId, LeaveRecord>>, PortError> {
        self.records
            .read()
            .map_err(|_| PortError::internal("leave store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<LeaveId, LeaveRecord>>, PortError> {
        self.records
            .write()
            .map_err(|_| PortError::internal("leave store lock poisoned"))
    }
}

impl DomainPort for InMemoryLeaveRepository {}

#[async_trait]
impl LeaveRepository for InMemoryLeaveRepository {
    async fn get(&self, id: LeaveId) -> Result<LeaveRecord, PortError> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("LeaveRecord", id))
    }

    async fn insert(&self, record: &LeaveRecord) -> Result<(), PortError> {
        let mut records = self.write()?;
        if records.values().any(|r| r.reference == record.reference) {
            return Err(PortError::conflict(format!(
                "leave reference {} already exists",
                record.reference
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &LeaveRecord) -> Result<(), PortError> {
        let mut records = self.write()?;
        match records.get_mut(&record.id) {
            Some(slot) if slot.is_cancelled() && !record.is_cancelled() => {
                Err(PortError::stale("LeaveRecord", record.id))
            }
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(PortError::not_found("LeaveRecord", record.id)),
        }
    }

    async fn update_status(&self, update: &LeaveStatusUpdate) -> Result<bool, PortError> {
        let mut records = self.write()?;
        let record = records
            .get_mut(&update.id)
            .ok_or_else(|| PortError::not_found("LeaveRecord", update.id))?;
        if record.is_cancelled() && update.status != LeaveStatus::Cancelled {
            return Ok(false);
        }
        record.status = update.status;
        record.updated_at = update.updated_at;
        Ok(true)
    }

    async fn delete(&self, id: LeaveId) -> Result<(), PortError> {
        self.write()?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PortError::not_found("LeaveRecord", id))
    }

    async fn list(&self) -> Result<Vec<LeaveRecord>, PortError> {
        let mut records: Vec<LeaveRecord> = self.read()?.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn apply_status_updates(&self, updates: &[LeaveStatusUpdate]) -> Result<(), PortError> {
        let mut records = self.write()?;
        for update in updates {
            if let Some(record) = records.get_mut(&update.id) {
                if record.status != LeaveStatus::Cancelled {
                    record.status = update.status;
                    record.updated_at = update.updated_at;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceRegistry for InMemoryLeaveRepository {
    async fn reference_exists(&self, kind: ReferenceKind, reference: &str) -> Result<bool, PortError> {
        if !matches!(kind, ReferenceKind::Leave(_)) {
            return Ok(false);
        }
        Ok(self.read()?.values().any(|r| r.reference == reference))
    }
}
