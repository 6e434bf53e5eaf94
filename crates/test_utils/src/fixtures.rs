//! Test Fixtures
//!
//! Pre-built price tables, dates and references shared across test suites.

use chrono::NaiveDate;
use core_kernel::{ClientId, FixedClock, LeaveType, Money};
use domain_pricing::PriceTier;
use rust_decimal_macros::dec;

/// Price tables used by pricing and invoicing tests
pub struct PricingFixtures;

impl PricingFixtures {
    /// Fixed sick tier of 1500 scoped to `client`
    pub fn client_fixed_sick(client: ClientId) -> PriceTier {
        PriceTier::fixed(LeaveType::Sick, Money::new(dec!(1500)))
            .expect("valid tier")
            .for_client(client)
    }

    /// General per-day sick tier of 200 at one day
    pub fn general_daily_sick() -> PriceTier {
        PriceTier::per_day(LeaveType::Sick, 1, Money::new(dec!(200))).expect("valid tier")
    }

    /// A client-fixed tier next to a general per-day tier
    ///
    /// Client A gets 1500 flat for any sick leave; everyone else pays 200
    /// per day.
    pub fn end_to_end(client: ClientId) -> Vec<PriceTier> {
        vec![Self::client_fixed_sick(client), Self::general_daily_sick()]
    }

    /// General per-day sick tiers at 3 days (300) and 10 days (800) only
    ///
    /// Requests of 5 and 15 days prorate from the tier below them; a
    /// 2-day request takes the 3-day tier's flat price.
    pub fn sparse_per_day() -> Vec<PriceTier> {
        vec![
            PriceTier::per_day(LeaveType::Sick, 3, Money::new(dec!(300))).expect("valid tier"),
            PriceTier::per_day(LeaveType::Sick, 10, Money::new(dec!(800))).expect("valid tier"),
        ]
    }
}

/// Dates used when a test needs a deterministic clinic "today"
pub struct DateFixtures;

impl DateFixtures {
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    /// 2024-01-10
    pub fn today() -> NaiveDate {
        Self::date(2024, 1, 10)
    }

    /// Clock fixed at noon UTC of [`DateFixtures::today`]
    pub fn clock() -> FixedClock {
        FixedClock::on_date(Self::today())
    }

    /// 2024-01-01 ..= 2024-01-05, five days, ended before `today`
    pub fn past_leave() -> (NaiveDate, NaiveDate) {
        (Self::date(2024, 1, 1), Self::date(2024, 1, 5))
    }

    /// 2024-01-08 ..= 2024-01-12, still running on `today`
    pub fn current_leave() -> (NaiveDate, NaiveDate) {
        (Self::date(2024, 1, 8), Self::date(2024, 1, 12))
    }
}

/// Fixed business references
pub struct ReferenceFixtures;

impl ReferenceFixtures {
    pub fn leave() -> &'static str {
        "SL2024010101"
    }

    pub fn invoice() -> &'static str {
        "INV-20240110-00001"
    }
}
