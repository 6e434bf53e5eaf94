//! PostgreSQL leave records

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{DomainPort, LeaveId, PortError, ReferenceKind, ReferenceRegistry};
use domain_leave::{LeaveRecord, LeaveRepository, LeaveStatusUpdate};

use crate::error::DatabaseError;
use crate::repositories::LeaveRecordRepository;

/// `LeaveRepository` backed by the `leave_records` table
#[derive(Debug, Clone)]
pub struct PostgresLeaveRepository {
    repository: LeaveRecordRepository,
}

impl PostgresLeaveRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: LeaveRecordRepository::new(pool),
        }
    }
}

impl DomainPort for PostgresLeaveRepository {}

#[async_trait]
impl LeaveRepository for PostgresLeaveRepository {
    async fn get(&self, id: LeaveId) -> Result<LeaveRecord, PortError> {
        let row = self.repository.get(Uuid::from(id)).await?;
        Ok(LeaveRecord::try_from(row)?)
    }

    async fn insert(&self, record: &LeaveRecord) -> Result<(), PortError> {
        self.repository.insert(record).await.map_err(|e| match e {
            DatabaseError::DuplicateEntry(_) => {
                PortError::conflict(format!("leave reference {} already exists", record.reference))
            }
            other => other.into(),
        })
    }

    async fn update(&self, record: &LeaveRecord) -> Result<(), PortError> {
        Ok(self.repository.update(record).await?)
    }

    async fn update_status(&self, update: &LeaveStatusUpdate) -> Result<bool, PortError> {
        Ok(self.repository.update_status(update).await?)
    }

    async fn delete(&self, id: LeaveId) -> Result<(), PortError> {
        Ok(self.repository.delete(Uuid::from(id)).await?)
    }

    async fn list(&self) -> Result<Vec<LeaveRecord>, PortError> {
        let rows = self.repository.list().await?;
        rows.into_iter()
            .map(|row| LeaveRecord::try_from(row).map_err(PortError::from))
            .collect()
    }

    async fn apply_status_updates(&self, updates: &[LeaveStatusUpdate]) -> Result<(), PortError> {
        Ok(self.repository.apply_status_updates(updates).await?)
    }
}

#[async_trait]
impl ReferenceRegistry for PostgresLeaveRepository {
    async fn reference_exists(&self, kind: ReferenceKind, reference: &str) -> Result<bool, PortError> {
        if !matches!(kind, ReferenceKind::Leave(_)) {
            return Ok(false);
        }
        Ok(self.repository.reference_exists(reference).await?)
    }
}
