//! Outcome of re-deriving a stored status

use serde::{Deserialize, Serialize};

/// Result of applying a status derivation to a stored record
///
/// Callers persist only on `Changed`; `Unchanged` is the "no write occurred"
/// signal that makes recomputation idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusChange<S> {
    Unchanged(S),
    Changed { from: S, to: S },
}

impl<S: Copy + PartialEq> StatusChange<S> {
    /// Compares a stored status with its freshly derived value
    pub fn between(from: S, to: S) -> Self {
        if from == to {
            StatusChange::Unchanged(from)
        } else {
            StatusChange::Changed { from, to }
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, StatusChange::Changed { .. })
    }

    /// The status after the derivation
    pub fn current(&self) -> S {
        match *self {
            StatusChange::Unchanged(s) => s,
            StatusChange::Changed { to, .. } => to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between() {
        assert_eq!(StatusChange::between(1, 1), StatusChange::Unchanged(1));
        let change = StatusChange::between(1, 2);
        assert!(change.is_changed());
        assert_eq!(change.current(), 2);
    }
}
