//! Business reference numbers
//!
//! Invoices and payments carry a human-facing number `PREFIX-YYYYMMDD-NNNNN`;
//! leave records use the compact form `PREFIXYYYYMMDDNN` (ten digits after the
//! prefix). Candidates are drawn at random and checked against a
//! [`ReferenceRegistry`]. After `max_attempts` collisions the generator falls
//! back to a suffix built from the full timestamp, and only escalates if that
//! collides too.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::leave_type::LeaveType;
use crate::ports::{DomainPort, PortError};
use crate::temporal::Clock;

/// Default bound on random attempts before falling back
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Entity kinds that receive reference numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Invoice,
    Payment,
    Leave(LeaveType),
}

impl ReferenceKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceKind::Invoice => "INV",
            ReferenceKind::Payment => "PAY",
            ReferenceKind::Leave(leave_type) => leave_type.reference_prefix(),
        }
    }

    fn is_compact(&self) -> bool {
        matches!(self, ReferenceKind::Leave(_))
    }

    fn sequence_modulus(&self) -> u128 {
        if self.is_compact() { 100 } else { 100_000 }
    }
}

/// Formats a reference number for `kind` on `date` with the given sequence
pub fn format_reference(kind: ReferenceKind, date: NaiveDate, sequence: u32) -> String {
    let day = date.format("%Y%m%d");
    if kind.is_compact() {
        format!("{}{}{:02}", kind.prefix(), day, sequence % 100)
    } else {
        format!("{}-{}-{:05}", kind.prefix(), day, sequence % 100_000)
    }
}

fn fallback_reference(kind: ReferenceKind, date: NaiveDate, now: DateTime<Utc>) -> String {
    let day = date.format("%Y%m%d");
    let stamp = now.format("%H%M%S%6f");
    if kind.is_compact() {
        format!("{}{}{}", kind.prefix(), day, stamp)
    } else {
        format!("{}-{}-{}", kind.prefix(), day, stamp)
    }
}

fn random_sequence(kind: ReferenceKind) -> u32 {
    (Uuid::new_v4().as_u128() % kind.sequence_modulus()) as u32
}

/// Lookup of reference numbers already in use
#[async_trait]
pub trait ReferenceRegistry: DomainPort {
    /// Returns true if `reference` is already taken for `kind`
    async fn reference_exists(&self, kind: ReferenceKind, reference: &str) -> Result<bool, PortError>;
}

/// Generates reference numbers unique within their entity kind
#[derive(Clone)]
pub struct ReferenceGenerator {
    registry: Arc<dyn ReferenceRegistry>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl ReferenceGenerator {
    pub fn new(registry: Arc<dyn ReferenceRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Produces a reference number not yet registered for `kind`
    ///
    /// # Errors
    ///
    /// `PortError::Conflict` if even the timestamp fallback is taken, or any
    /// error from the registry.
    pub async fn generate(&self, kind: ReferenceKind) -> Result<String, PortError> {
        let today = self.clock.today();

        for attempt in 1..=self.max_attempts {
            let candidate = format_reference(kind, today, random_sequence(kind));
            if !self.registry.reference_exists(kind, &candidate).await? {
                return Ok(candidate);
            }
            debug!(%candidate, attempt, "reference number collision");
        }

        let fallback = fallback_reference(kind, today, self.clock.now());
        warn!(
            prefix = kind.prefix(),
            attempts = self.max_attempts,
            %fallback,
            "reference attempts exhausted, using timestamp suffix"
        );

        if self.registry.reference_exists(kind, &fallback).await? {
            return Err(PortError::conflict(format!(
                "reference number {} already in use",
                fallback
            )));
        }
        Ok(fallback)
    }
}
