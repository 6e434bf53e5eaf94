//! The price table port
//!
//! `PriceTierRepository` is the storage/lookup primitive the resolver runs
//! its waterfall over. A lookup is described by a [`TierQuery`] and returns
//! zero or one tier with deterministic "first match" semantics:
//!
//! - `DurationMatch::ClosestBelow(n)` picks the largest duration `< n`
//! - `DurationMatch::ClosestAbove(n)` picks the smallest duration `> n`
//! - ties (and all other filters) fall back to creation order, then id

use std::cmp::Ordering;

use async_trait::async_trait;

use core_kernel::{ClientId, DomainPort, LeaveType, PortError, PriceTierId};

use crate::tier::{PriceTier, PricingType};

/// Which tiers a lookup may consider with respect to the client column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientScope {
    /// Only tiers with no client (the general tariff)
    General,
    /// Only tiers belonging to this client
    Client(ClientId),
    /// Either
    Any,
}

impl ClientScope {
    fn admits(&self, client_id: Option<ClientId>) -> bool {
        match self {
            ClientScope::General => client_id.is_none(),
            ClientScope::Client(wanted) => client_id == Some(*wanted),
            ClientScope::Any => true,
        }
    }
}

/// Duration filter of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationMatch {
    Exact(u32),
    ClosestBelow(u32),
    ClosestAbove(u32),
}

impl DurationMatch {
    fn admits(&self, duration_days: u32) -> bool {
        match *self {
            DurationMatch::Exact(n) => duration_days == n,
            DurationMatch::ClosestBelow(n) => duration_days < n,
            DurationMatch::ClosestAbove(n) => duration_days > n,
        }
    }
}

/// A single price-table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuery {
    pub leave_type: LeaveType,
    pub pricing_type: Option<PricingType>,
    pub client: ClientScope,
    pub duration: Option<DurationMatch>,
    pub active_only: bool,
}

impl TierQuery {
    /// Active tiers of `leave_type`, any client, any mode, any duration
    pub fn for_leave_type(leave_type: LeaveType) -> Self {
        Self {
            leave_type,
            pricing_type: None,
            client: ClientScope::Any,
            duration: None,
            active_only: true,
        }
    }

    pub fn pricing_type(mut self, pricing_type: PricingType) -> Self {
        self.pricing_type = Some(pricing_type);
        self
    }

    pub fn client(mut self, client: ClientScope) -> Self {
        self.client = client;
        self
    }

    pub fn duration(mut self, duration: DurationMatch) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn include_inactive(mut self) -> Self {
        self.active_only = false;
        self
    }

    /// True if `tier` passes every filter of this query
    pub fn matches(&self, tier: &PriceTier) -> bool {
        tier.leave_type == self.leave_type
            && (!self.active_only || tier.active)
            && self.pricing_type.map_or(true, |p| tier.pricing_type == p)
            && self.client.admits(tier.client_id)
            && self.duration.map_or(true, |d| d.admits(tier.duration_days))
    }

    /// Orders two matching tiers; the `Less` one wins
    fn rank(&self, a: &PriceTier, b: &PriceTier) -> Ordering {
        let by_duration = match self.duration {
            Some(DurationMatch::ClosestBelow(_)) => b.duration_days.cmp(&a.duration_days),
            Some(DurationMatch::ClosestAbove(_)) => a.duration_days.cmp(&b.duration_days),
            _ => Ordering::Equal,
        };
        by_duration
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Applies the query to an in-memory set of tiers
    pub fn select<'a, I>(&self, tiers: I) -> Option<&'a PriceTier>
    where
        I: IntoIterator<Item = &'a PriceTier>,
    {
        tiers
            .into_iter()
            .filter(|tier| self.matches(tier))
            .min_by(|a, b| self.rank(a, b))
    }
}

/// Storage of price tiers
///
/// The engine itself only reads active tiers; `save` exists for the
/// administrative surface and for seeding. Implementations must reject a
/// save that would leave two active tiers with the same
/// (leave_type, duration_days, client_id, pricing_type) with
/// `PortError::Conflict`.
#[async_trait]
pub trait PriceTierRepository: DomainPort {
    /// Returns the first tier matching `query`, if any
    async fn find(&self, query: &TierQuery) -> Result<Option<PriceTier>, PortError>;

    /// Returns a tier by id
    async fn get(&self, id: PriceTierId) -> Result<PriceTier, PortError>;

    /// Inserts or updates a tier
    async fn save(&self, tier: &PriceTier) -> Result<(), PortError>;

    /// Lists tiers of one leave type (or all), ordered by creation
    async fn list(&self, leave_type: Option<LeaveType>, active_only: bool) -> Result<Vec<PriceTier>, PortError>;
}
