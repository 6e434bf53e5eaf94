//! Row identities for clinic billing entities
//!
//! Each id wraps a UUID so a `LeaveId` cannot be handed to an invoice lookup.
//! They are storage keys only; clerks and clients see the reference numbers
//! from [`crate::reference`] (`INV-20240105-00042`, `SL2024010501`).
//!
//! Ids print as `<PREFIX>-<uuid>` in logs and parse back from that form or
//! from the bare UUID that the database and JSON carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! clinic_ids {
    ($($(#[$doc:meta])* $name:ident => $prefix:literal;)+) => {$(
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Log prefix, e.g. `INV` in `INV-0190c2...`
            pub const PREFIX: &'static str = $prefix;

            /// A random id, for tests and ad hoc records
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// A time-ordered id; rows created later sort later
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bare = s
                    .strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .unwrap_or(s);
                Uuid::parse_str(bare).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    )+};
}

clinic_ids! {
    /// A billed party: insurer, employer or private patient
    ClientId => "CLI";
    /// An issued invoice for one leave
    InvoiceId => "INV";
    /// A payment received from a client
    PaymentId => "PAY";
    /// One slice of a payment applied to one invoice
    AllocationId => "ALC";
    /// A sick or companion leave record
    LeaveId => "LV";
    /// A row of the leave price table
    PriceTierId => "TIER";
}
