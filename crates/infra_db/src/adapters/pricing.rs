//! PostgreSQL price table

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{DomainPort, LeaveType, PortError, PriceTierId};
use domain_pricing::{PriceTier, PriceTierRepository, TierQuery};

use crate::error::DatabaseError;
use crate::repositories::PricingRepository;

/// `PriceTierRepository` backed by the `price_tiers` table
#[derive(Debug, Clone)]
pub struct PostgresPriceTable {
    repository: PricingRepository,
}

impl PostgresPriceTable {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: PricingRepository::new(pool),
        }
    }
}

impl DomainPort for PostgresPriceTable {}

#[async_trait]
impl PriceTierRepository for PostgresPriceTable {
    #[instrument(skip(self), level = "debug")]
    async fn find(&self, query: &TierQuery) -> Result<Option<PriceTier>, PortError> {
        let row = self.repository.find(query).await?;
        Ok(row.map(PriceTier::try_from).transpose()?)
    }

    async fn get(&self, id: PriceTierId) -> Result<PriceTier, PortError> {
        let row = self.repository.get(Uuid::from(id)).await?;
        Ok(PriceTier::try_from(row)?)
    }

    async fn save(&self, tier: &PriceTier) -> Result<(), PortError> {
        self.repository.upsert(tier).await.map_err(|e| match e {
            DatabaseError::DuplicateEntry(_) => PortError::conflict(format!(
                "an active {} {} tier for {} day(s) already exists",
                tier.leave_type,
                tier.pricing_type.code(),
                tier.duration_days
            )),
            other => other.into(),
        })
    }

    async fn list(&self, leave_type: Option<LeaveType>, active_only: bool) -> Result<Vec<PriceTier>, PortError> {
        let rows = self.repository.list(leave_type, active_only).await?;
        rows.into_iter()
            .map(|row| PriceTier::try_from(row).map_err(PortError::from))
            .collect()
    }
}
