//! Leave type catalogue shared by pricing, leave records and invoices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The kinds of leave the clinic issues and bills for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveType {
    /// Sick leave for the patient
    Sick,
    /// Leave for a companion accompanying a patient
    Companion,
}

impl LeaveType {
    /// All leave types, in catalogue order
    pub const ALL: [LeaveType; 2] = [LeaveType::Sick, LeaveType::Companion];

    /// Returns the storage code
    pub fn code(&self) -> &'static str {
        match self {
            LeaveType::Sick => "sick",
            LeaveType::Companion => "companion",
        }
    }

    /// Prefix used for leave reference numbers (`SL2024010501`)
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            LeaveType::Sick => "SL",
            LeaveType::Companion => "CL",
        }
    }
}

impl fmt::Display for LeaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LeaveType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sick" => Ok(LeaveType::Sick),
            "companion" => Ok(LeaveType::Companion),
            other => Err(CoreError::validation(format!("unknown leave type '{}'", other))),
        }
    }
}
