//! In-memory price table
//!
//! Backs unit tests and embedded use without a database. Lookups go through
//! [`TierQuery::select`], so ordering matches the SQL adapter.

use std::sync::RwLock;

use async_trait::async_trait;

use core_kernel::{DomainPort, LeaveType, PortError, PriceTierId};

use crate::table::{PriceTierRepository, TierQuery};
use crate::tier::PriceTier;

#[derive(Debug, Default)]
pub struct InMemoryPriceTable {
    tiers: RwLock<Vec<PriceTier>>,
}

impl InMemoryPriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from tiers, enforcing the active-uniqueness rule
    pub fn with_tiers(tiers: impl IntoIterator<Item = PriceTier>) -> Result<Self, PortError> {
        let table = Self::new();
        {
            let mut guard = table.write()?;
            for tier in tiers {
                upsert(&mut guard, tier)?;
            }
        }
        Ok(table)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<PriceTier>>, PortError> {
        self.tiers
            .read()
            .map_err(|_| PortError::internal("price table lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<PriceTier>>, PortError> {
        self.tiers
            .write()
            .map_err(|_| PortError::internal("price table lock poisoned"))
    }
}

fn upsert(tiers: &mut Vec<PriceTier>, tier: PriceTier) -> Result<(), PortError> {
    if let Some(existing) = tiers.iter().find(|t| t.conflicts_with(&tier)) {
        return Err(PortError::conflict(format!(
            "an active {} {} tier for {} day(s) already exists ({})",
            tier.leave_type,
            tier.pricing_type.code(),
            tier.duration_days,
            existing.id
        )));
    }

    match tiers.iter_mut().find(|t| t.id == tier.id) {
        Some(slot) => *slot = tier,
        None => tiers.push(tier),
    }
    Ok(())
}

impl DomainPort for InMemoryPriceTable {}

#[async_trait]
impl PriceTierRepository for InMemoryPriceTable {
    async fn find(&self, query: &TierQuery) -> Result<Option<PriceTier>, PortError> {
        let tiers = self.read()?;
        Ok(query.select(tiers.iter()).cloned())
    }

    async fn get(&self, id: PriceTierId) -> Result<PriceTier, PortError> {
        self.read()?
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PriceTier", id))
    }

    async fn save(&self, tier: &PriceTier) -> Result<(), PortError> {
        let mut tiers = self.write()?;
        upsert(&mut tiers, tier.clone())
    }

    async fn list(&self, leave_type: Option<LeaveType>, active_only: bool) -> Result<Vec<PriceTier>, PortError> {
        let mut tiers: Vec<PriceTier> = self
            .read()?
            .iter()
            .filter(|t| leave_type.map_or(true, |lt| t.leave_type == lt))
            .filter(|t| !active_only || t.active)
            .cloned()
            .collect();
        tiers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tiers)
    }
}
