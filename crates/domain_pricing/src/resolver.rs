//! Price resolution waterfall
//!
//! Resolves the price of a leave from the tier table, trying each step in
//! order and returning on the first hit:
//!
//! | Step | Scope   | Mode    | Duration       | Price            |
//! |------|---------|---------|----------------|------------------|
//! | 1    | client  | fixed   | any            | as-is            |
//! | 2    | client  | per-day | exact          | as-is            |
//! | 3    | client  | per-day | closest below  | prorated         |
//! | 4    | client  | per-day | closest above  | as-is            |
//! | 5    | general | fixed   | any            | as-is            |
//! | 6    | general | per-day | exact          | as-is            |
//! | 7    | general | per-day | closest below  | prorated         |
//! | 8    | general | per-day | closest above  | as-is            |
//!
//! Steps 1-4 only run when a client is given. Proration is
//! `tier.price / tier.duration_days * requested_days`, rounded to minor
//! units. Nearest-above tiers are deliberately *not* prorated.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use core_kernel::{ClientId, LeaveType, Money, PriceTierId};

use crate::error::PricingError;
use crate::table::{ClientScope, DurationMatch, PriceTierRepository, TierQuery};
use crate::tier::{PriceTier, PricingType};

/// One step of the waterfall, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterfallStep {
    ClientFixed = 1,
    ClientExact = 2,
    ClientBelow = 3,
    ClientAbove = 4,
    GeneralFixed = 5,
    GeneralExact = 6,
    GeneralBelow = 7,
    GeneralAbove = 8,
}

impl WaterfallStep {
    pub const ORDER: [WaterfallStep; 8] = [
        WaterfallStep::ClientFixed,
        WaterfallStep::ClientExact,
        WaterfallStep::ClientBelow,
        WaterfallStep::ClientAbove,
        WaterfallStep::GeneralFixed,
        WaterfallStep::GeneralExact,
        WaterfallStep::GeneralBelow,
        WaterfallStep::GeneralAbove,
    ];

    /// 1-based position in the waterfall
    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn is_client_step(&self) -> bool {
        self.number() <= 4
    }

    pub fn prorates(&self) -> bool {
        matches!(self, WaterfallStep::ClientBelow | WaterfallStep::GeneralBelow)
    }

    /// The price-table lookup for this step, or `None` if the step is skipped
    fn query(&self, leave_type: LeaveType, duration_days: u32, client_id: Option<ClientId>) -> Option<TierQuery> {
        let scope = if self.is_client_step() {
            ClientScope::Client(client_id?)
        } else {
            ClientScope::General
        };

        let base = TierQuery::for_leave_type(leave_type).client(scope);
        let query = match self {
            WaterfallStep::ClientFixed | WaterfallStep::GeneralFixed => {
                base.pricing_type(PricingType::Fixed)
            }
            WaterfallStep::ClientExact | WaterfallStep::GeneralExact => base
                .pricing_type(PricingType::PerDay)
                .duration(DurationMatch::Exact(duration_days)),
            WaterfallStep::ClientBelow | WaterfallStep::GeneralBelow => base
                .pricing_type(PricingType::PerDay)
                .duration(DurationMatch::ClosestBelow(duration_days)),
            WaterfallStep::ClientAbove | WaterfallStep::GeneralAbove => base
                .pricing_type(PricingType::PerDay)
                .duration(DurationMatch::ClosestAbove(duration_days)),
        };
        Some(query)
    }
}

impl fmt::Display for WaterfallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaterfallStep::ClientFixed => "client fixed",
            WaterfallStep::ClientExact => "client per-day exact",
            WaterfallStep::ClientBelow => "client per-day below (prorated)",
            WaterfallStep::ClientAbove => "client per-day above",
            WaterfallStep::GeneralFixed => "general fixed",
            WaterfallStep::GeneralExact => "general per-day exact",
            WaterfallStep::GeneralBelow => "general per-day below (prorated)",
            WaterfallStep::GeneralAbove => "general per-day above",
        };
        write!(f, "step {} ({})", self.number(), label)
    }
}

/// A resolved price together with how it was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub price: Money,
    pub step: WaterfallStep,
    pub tier_id: PriceTierId,
    pub prorated: bool,
}

/// Resolves leave prices against an injected price table
#[derive(Clone)]
pub struct PriceResolver {
    tiers: Arc<dyn PriceTierRepository>,
}

impl PriceResolver {
    pub fn new(tiers: Arc<dyn PriceTierRepository>) -> Self {
        Self { tiers }
    }

    /// Resolves the price for a leave
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `duration_days <= 0`
    /// - `NoPriceFound` if no step matched; a zero-priced tier is a hit, not this
    pub async fn resolve(
        &self,
        leave_type: LeaveType,
        duration_days: i64,
        client_id: Option<ClientId>,
    ) -> Result<Money, PricingError> {
        self.resolve_detailed(leave_type, duration_days, client_id)
            .await
            .map(|resolved| resolved.price)
    }

    /// Resolves the price, substituting `default` when no tier matches
    pub async fn resolve_or(
        &self,
        leave_type: LeaveType,
        duration_days: i64,
        client_id: Option<ClientId>,
        default: Money,
    ) -> Result<Money, PricingError> {
        match self.resolve(leave_type, duration_days, client_id).await {
            Err(PricingError::NoPriceFound { .. }) => Ok(default),
            other => other,
        }
    }

    /// Resolves the price and reports which step and tier produced it
    ///
    /// # Arguments
    ///
    /// * `leave_type` - Sick or companion leave
    /// * `duration_days` - Requested length; must be at least 1
    /// * `client_id` - Billed client, or `None` to use general tiers only
    ///
    /// # Returns
    ///
    /// The first waterfall hit: the price, the step that matched, the tier
    /// it came from and whether the price was prorated per day.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    #[instrument(skip(self))]
    pub async fn resolve_detailed(
        &self,
        leave_type: LeaveType,
        duration_days: i64,
        client_id: Option<ClientId>,
    ) -> Result<ResolvedPrice, PricingError> {
        let requested = validate_duration(duration_days)?;

        for step in WaterfallStep::ORDER {
            let Some(query) = step.query(leave_type, requested, client_id) else {
                continue;
            };

            if let Some(tier) = self.tiers.find(&query).await? {
                let resolved = price_from_tier(step, &tier, requested)?;
                debug!(
                    %step,
                    tier_id = %tier.id,
                    price = %resolved.price,
                    "price resolved"
                );
                return Ok(resolved);
            }
        }

        debug!(duration_days = requested, "no tier matched");
        Err(PricingError::NoPriceFound {
            leave_type,
            duration_days: requested,
            client_id,
        })
    }
}

fn validate_duration(duration_days: i64) -> Result<u32, PricingError> {
    if duration_days <= 0 {
        return Err(PricingError::invalid_input(format!(
            "duration_days must be positive, got {}",
            duration_days
        )));
    }
    u32::try_from(duration_days)
        .map_err(|_| PricingError::invalid_input(format!("duration_days {} out of range", duration_days)))
}

fn price_from_tier(step: WaterfallStep, tier: &PriceTier, requested: u32) -> Result<ResolvedPrice, PricingError> {
    let price = if step.prorates() {
        prorate(tier.price, tier.duration_days, requested)?
    } else {
        tier.price
    };

    Ok(ResolvedPrice {
        price,
        step,
        tier_id: tier.id,
        prorated: step.prorates(),
    })
}

/// `price / tier_days * requested_days`, rounded to minor units
pub fn prorate(price: Money, tier_days: u32, requested_days: u32) -> Result<Money, PricingError> {
    let daily = price
        .amount()
        .checked_div(Decimal::from(tier_days))
        .ok_or(core_kernel::MoneyError::DivisionByZero)?;
    let total = daily
        .checked_mul(Decimal::from(requested_days))
        .ok_or(core_kernel::MoneyError::Overflow)?;
    Ok(Money::new(total).round_to_minor())
}
