//! Price tiers
//!
//! A tier prices one leave type either as a flat amount for the whole leave
//! (`Fixed`) or as the price of a specific duration (`PerDay`), optionally
//! scoped to a single billing client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ClientId, LeaveType, Money, PriceTierId};

use crate::error::PricingError;

/// How a tier's price relates to the leave duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    /// Flat price for the whole leave, whatever its length
    Fixed,
    /// Price for exactly `duration_days`, usable verbatim or prorated
    PerDay,
}

impl PricingType {
    pub fn code(&self) -> &'static str {
        match self {
            PricingType::Fixed => "fixed",
            PricingType::PerDay => "per_day",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "fixed" => Some(PricingType::Fixed),
            "per_day" => Some(PricingType::PerDay),
            _ => None,
        }
    }
}

/// The columns over which at most one active tier may exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TierKey {
    pub leave_type: LeaveType,
    pub duration_days: u32,
    pub client_id: Option<ClientId>,
    pub pricing_type: PricingType,
}

/// A priced rule keyed by leave type, duration, pricing mode and client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    pub id: PriceTierId,
    pub leave_type: LeaveType,
    pub duration_days: u32,
    pub pricing_type: PricingType,
    /// `None` for the general tariff
    pub client_id: Option<ClientId>,
    pub price: Money,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PriceTier {
    /// Creates an active general tier
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `duration_days` is zero or `price` is negative.
    pub fn new(
        leave_type: LeaveType,
        duration_days: u32,
        pricing_type: PricingType,
        price: Money,
    ) -> Result<Self, PricingError> {
        if duration_days == 0 {
            return Err(PricingError::invalid_input("tier duration_days must be positive"));
        }
        if price.is_negative() {
            return Err(PricingError::invalid_input(format!(
                "tier price must not be negative, got {}",
                price
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: PriceTierId::new_v7(),
            leave_type,
            duration_days,
            pricing_type,
            client_id: None,
            price,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Shorthand for a fixed tier (duration is informational only)
    pub fn fixed(leave_type: LeaveType, price: Money) -> Result<Self, PricingError> {
        Self::new(leave_type, 1, PricingType::Fixed, price)
    }

    /// Shorthand for a per-day tier at `duration_days`
    pub fn per_day(leave_type: LeaveType, duration_days: u32, price: Money) -> Result<Self, PricingError> {
        Self::new(leave_type, duration_days, PricingType::PerDay, price)
    }

    /// Scopes the tier to a single client
    pub fn for_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Changes the price (administrative edit)
    pub fn reprice(&mut self, price: Money) -> Result<(), PricingError> {
        if price.is_negative() {
            return Err(PricingError::invalid_input("tier price must not be negative"));
        }
        self.price = price;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = Utc::now();
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.updated_at = Utc::now();
    }

    pub fn key(&self) -> TierKey {
        TierKey {
            leave_type: self.leave_type,
            duration_days: self.duration_days,
            client_id: self.client_id,
            pricing_type: self.pricing_type,
        }
    }

    /// True if both tiers are active and share a uniqueness key
    pub fn conflicts_with(&self, other: &PriceTier) -> bool {
        self.id != other.id && self.active && other.active && self.key() == other.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zero_duration_rejected() {
        let result = PriceTier::new(LeaveType::Sick, 0, PricingType::PerDay, Money::new(dec!(100)));
        assert!(matches!(result, Err(PricingError::InvalidInput(_))));
    }

    #[test]
    fn test_negative_price_rejected() {
        let result = PriceTier::per_day(LeaveType::Sick, 3, Money::new(dec!(-1)));
        assert!(matches!(result, Err(PricingError::InvalidInput(_))));
    }

    #[test]
    fn test_conflict_requires_same_key_and_both_active() {
        let client = ClientId::new();
        let a = PriceTier::per_day(LeaveType::Sick, 3, Money::new(dec!(300))).unwrap().for_client(client);
        let mut b = PriceTier::per_day(LeaveType::Sick, 3, Money::new(dec!(350))).unwrap().for_client(client);
        let general = PriceTier::per_day(LeaveType::Sick, 3, Money::new(dec!(300))).unwrap();

        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&general));

        b.deactivate();
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn test_pricing_type_codes() {
        assert_eq!(PricingType::from_code("per_day"), Some(PricingType::PerDay));
        assert_eq!(PricingType::from_code(PricingType::Fixed.code()), Some(PricingType::Fixed));
        assert_eq!(PricingType::from_code("weekly"), None);
    }
}
