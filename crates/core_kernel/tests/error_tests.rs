//! Tests for core_kernel error types

use chrono::NaiveDate;
use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::{PortError, TemporalError};
use rust_decimal_macros::dec;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_from_money_error() {
    let core_error: CoreError = MoneyError::Negative(dec!(-5)).into();

    assert!(matches!(core_error, CoreError::Money(MoneyError::Negative(_))));
    assert!(core_error.to_string().contains("-5"));
}

#[test]
fn test_core_error_from_temporal_error() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let core_error: CoreError = TemporalError::InvalidPeriod { start, end }.into();

    assert!(core_error.to_string().contains("2024-01-01"));
}

#[test]
fn test_port_error_predicates() {
    assert!(PortError::connection("refused").is_transient());
    assert!(!PortError::stale("Invoice", "x").is_transient());
    assert!(PortError::stale("Invoice", "x").is_stale());
    assert!(PortError::conflict("duplicate reference").is_conflict());
    assert!(PortError::not_found("Payment", "p-1").is_not_found());
    assert!(!PortError::validation("bad").is_not_found());
}

#[test]
fn test_port_error_messages_name_the_entity() {
    let err = PortError::not_found("Invoice", "INV-1");
    assert!(err.to_string().contains("Invoice"));
    assert!(err.to_string().contains("INV-1"));

    let err = PortError::stale("Payment", "PAY-1");
    assert!(err.to_string().contains("modified concurrently"));
}
