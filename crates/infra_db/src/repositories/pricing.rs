//! Price tier repository
//!
//! Lookups are translated from a [`TierQuery`] into a single `SELECT ...
//! LIMIT 1` whose `ORDER BY` reproduces the in-memory ranking: closest
//! duration first for the range matches, then creation order, then id.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use core_kernel::{ClientId, LeaveType, Money};
use domain_pricing::{ClientScope, DurationMatch, PriceTier, PricingType, TierQuery};

use crate::error::DatabaseError;

const TIER_COLUMNS: &str =
    "id, leave_type, duration_days, pricing_type, client_id, price, active, created_at, updated_at";

/// Database row for the `price_tiers` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceTierRow {
    pub id: Uuid,
    pub leave_type: String,
    pub duration_days: i32,
    pub pricing_type: String,
    pub client_id: Option<Uuid>,
    pub price: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PriceTierRow> for PriceTier {
    type Error = DatabaseError;

    fn try_from(row: PriceTierRow) -> Result<Self, Self::Error> {
        let leave_type: LeaveType = row
            .leave_type
            .parse()
            .map_err(|e: core_kernel::CoreError| DatabaseError::corrupt(e.to_string()))?;
        let pricing_type = PricingType::from_code(&row.pricing_type)
            .ok_or_else(|| DatabaseError::corrupt(format!("unknown pricing type '{}'", row.pricing_type)))?;
        let duration_days = u32::try_from(row.duration_days)
            .map_err(|_| DatabaseError::corrupt(format!("negative tier duration {}", row.duration_days)))?;

        Ok(PriceTier {
            id: row.id.into(),
            leave_type,
            duration_days,
            pricing_type,
            client_id: row.client_id.map(ClientId::from),
            price: Money::new(row.price),
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A day count as the `INTEGER` the schema stores
///
/// Counts past `i32::MAX` cannot be stored and are rejected rather than clamped.
pub(crate) fn days(n: u32) -> Result<i32, DatabaseError> {
    i32::try_from(n)
        .map_err(|_| DatabaseError::ConstraintViolation(format!("duration of {} days is out of range", n)))
}

#[derive(Debug, Clone)]
pub struct PricingRepository {
    pool: PgPool,
}

impl PricingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The first tier matching `query`
    pub async fn find(&self, query: &TierQuery) -> Result<Option<PriceTierRow>, DatabaseError> {
        let mut sql = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM price_tiers WHERE leave_type = ",
            TIER_COLUMNS
        ));
        sql.push_bind(query.leave_type.code());

        if query.active_only {
            sql.push(" AND active");
        }
        if let Some(pricing_type) = query.pricing_type {
            sql.push(" AND pricing_type = ").push_bind(pricing_type.code());
        }
        match query.client {
            ClientScope::General => {
                sql.push(" AND client_id IS NULL");
            }
            ClientScope::Client(client_id) => {
                sql.push(" AND client_id = ").push_bind(Uuid::from(client_id));
            }
            ClientScope::Any => {}
        }

        let duration_order = match query.duration {
            Some(DurationMatch::Exact(n)) => {
                sql.push(" AND duration_days = ").push_bind(days(n)?);
                ""
            }
            Some(DurationMatch::ClosestBelow(n)) => {
                sql.push(" AND duration_days < ").push_bind(days(n)?);
                "duration_days DESC, "
            }
            Some(DurationMatch::ClosestAbove(n)) => {
                sql.push(" AND duration_days > ").push_bind(days(n)?);
                "duration_days ASC, "
            }
            None => "",
        };
        sql.push(format!(" ORDER BY {}created_at, id LIMIT 1", duration_order));

        let row = sql
            .build_query_as::<PriceTierRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> Result<PriceTierRow, DatabaseError> {
        sqlx::query_as::<_, PriceTierRow>(&format!(
            "SELECT {} FROM price_tiers WHERE id = $1",
            TIER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("PriceTier", id))
    }

    /// Inserts or updates a tier
    ///
    /// The partial unique index on active tiers surfaces as `DuplicateEntry`.
    pub async fn upsert(&self, tier: &PriceTier) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO price_tiers (
                id, leave_type, duration_days, pricing_type, client_id,
                price, active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                leave_type = EXCLUDED.leave_type,
                duration_days = EXCLUDED.duration_days,
                pricing_type = EXCLUDED.pricing_type,
                client_id = EXCLUDED.client_id,
                price = EXCLUDED.price,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(tier.id))
        .bind(tier.leave_type.code())
        .bind(days(tier.duration_days)?)
        .bind(tier.pricing_type.code())
        .bind(tier.client_id.map(Uuid::from))
        .bind(tier.price.amount())
        .bind(tier.active)
        .bind(tier.created_at)
        .bind(tier.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(
        &self,
        leave_type: Option<LeaveType>,
        active_only: bool,
    ) -> Result<Vec<PriceTierRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PriceTierRow>(&format!(
            r#"
            SELECT {} FROM price_tiers
            WHERE ($1::TEXT IS NULL OR leave_type = $1)
              AND (NOT $2 OR active)
            ORDER BY created_at, id
            "#,
            TIER_COLUMNS
        ))
        .bind(leave_type.map(|lt| lt.code()))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
