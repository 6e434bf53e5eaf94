//! Pricing Domain - Tiered leave prices
//!
//! The clinic bills each leave from a table of price tiers. This crate holds
//! the tier model, the price-table port, and the resolver that walks the
//! fallback waterfall to a single price.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_pricing::{PriceResolver, InMemoryPriceTable, PriceTier};
//!
//! let table = InMemoryPriceTable::with_tiers([
//!     PriceTier::per_day(LeaveType::Sick, 1, Money::new(dec!(200)))?,
//! ])?;
//! let resolver = PriceResolver::new(Arc::new(table));
//!
//! let price = resolver.resolve(LeaveType::Sick, 1, None).await?;
//! ```

pub mod tier;
pub mod table;
pub mod resolver;
pub mod memory;
pub mod error;

pub use tier::{PriceTier, PricingType, TierKey};
pub use table::{ClientScope, DurationMatch, PriceTierRepository, TierQuery};
pub use resolver::{prorate, PriceResolver, ResolvedPrice, WaterfallStep};
pub use memory::InMemoryPriceTable;
pub use error::PricingError;
