//! Leave record repository

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::LeaveType;
use domain_leave::{LeaveRecord, LeaveStatus, LeaveStatusUpdate};

use crate::error::DatabaseError;
use crate::repositories::pricing::days;

const LEAVE_COLUMNS: &str =
    "id, reference, leave_type, start_date, end_date, duration_days, status, created_at, updated_at";

/// Database row for the `leave_records` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaveRecordRow {
    pub id: Uuid,
    pub reference: String,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeaveRecordRow> for LeaveRecord {
    type Error = DatabaseError;

    fn try_from(row: LeaveRecordRow) -> Result<Self, Self::Error> {
        let leave_type: LeaveType = row
            .leave_type
            .parse()
            .map_err(|e: core_kernel::CoreError| DatabaseError::corrupt(e.to_string()))?;
        let status = LeaveStatus::from_code(&row.status)
            .ok_or_else(|| DatabaseError::corrupt(format!("unknown leave status '{}'", row.status)))?;
        let duration_days = u32::try_from(row.duration_days)
            .map_err(|_| DatabaseError::corrupt(format!("negative leave duration {}", row.duration_days)))?;

        Ok(LeaveRecord {
            id: row.id.into(),
            reference: row.reference,
            leave_type,
            start_date: row.start_date,
            end_date: row.end_date,
            duration_days,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LeaveRecordRepository {
    pool: PgPool,
}

impl LeaveRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<LeaveRecordRow, DatabaseError> {
        sqlx::query_as::<_, LeaveRecordRow>(&format!(
            "SELECT {} FROM leave_records WHERE id = $1",
            LEAVE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("LeaveRecord", id))
    }

    pub async fn insert(&self, record: &LeaveRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO leave_records (
                id, reference, leave_type, start_date, end_date,
                duration_days, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::from(record.id))
        .bind(&record.reference)
        .bind(record.leave_type.code())
        .bind(record.start_date)
        .bind(record.end_date)
        .bind(days(record.duration_days)?)
        .bind(record.status.code())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replaces a record's fields
    ///
    /// A stored `cancelled` status is only overwritten by `cancelled`; any
    /// other write to a cancelled row is reported as `StaleVersion`.
    pub async fn update(&self, record: &LeaveRecord) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE leave_records SET
                leave_type = $2, start_date = $3, end_date = $4,
                duration_days = $5, status = $6, updated_at = $7
            WHERE id = $1 AND (status <> 'cancelled' OR $6 = 'cancelled')
            "#,
        )
        .bind(Uuid::from(record.id))
        .bind(record.leave_type.code())
        .bind(record.start_date)
        .bind(record.end_date)
        .bind(days(record.duration_days)?)
        .bind(record.status.code())
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.missing_or_stale(record.id.into()).await);
        }
        Ok(())
    }

    /// Writes one status under the cancel guard; `false` when the row was
    /// already cancelled
    pub async fn update_status(&self, update: &LeaveStatusUpdate) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE leave_records SET status = $2, updated_at = $3
            WHERE id = $1 AND (status <> 'cancelled' OR $2 = 'cancelled')
            "#,
        )
        .bind(Uuid::from(update.id))
        .bind(update.status.code())
        .bind(update.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.get(update.id.into()).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn missing_or_stale(&self, id: Uuid) -> DatabaseError {
        match self.get(id).await {
            Ok(_) => DatabaseError::stale("LeaveRecord", id),
            Err(e) => e,
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM leave_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("LeaveRecord", id));
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<LeaveRecordRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, LeaveRecordRow>(&format!(
            "SELECT {} FROM leave_records ORDER BY created_at, id",
            LEAVE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Writes a sweep's status changes in one transaction
    ///
    /// The `status <> 'cancelled'` guard lets a cancel committed after the
    /// sweep's read win.
    pub async fn apply_status_updates(&self, updates: &[LeaveStatusUpdate]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for update in updates {
            sqlx::query(
                r#"
                UPDATE leave_records SET status = $2, updated_at = $3
                WHERE id = $1 AND status <> 'cancelled'
                "#,
            )
            .bind(Uuid::from(update.id))
            .bind(update.status.code())
            .bind(update.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn reference_exists(&self, reference: &str) -> Result<bool, DatabaseError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM leave_records WHERE reference = $1)")
                .bind(reference)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}
