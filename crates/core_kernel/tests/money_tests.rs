//! Unit tests for the Money module
//!
//! Covers construction, currency safety, and the arithmetic the ledger
//! relies on. A small property suite checks closure under addition.

use core_kernel::{Currency, Money, MoneyError};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[test]
fn test_zero_is_zero_in_every_currency() {
    for currency in [Currency::USD, Currency::EUR, Currency::GBP, Currency::JPY, Currency::RUB] {
        let zero = Money::zero(currency);
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert_eq!(zero.currency(), currency);
    }
}

#[test]
fn test_minor_units_respect_currency_precision() {
    assert_eq!(Money::from_minor(1234, Currency::USD).amount(), dec!(12.34));
    assert_eq!(Money::from_minor(1234, Currency::JPY).amount(), dec!(1234));
}

#[test]
fn test_addition_and_subtraction() {
    let a = Money::new(dec!(10.50), Currency::EUR);
    let b = Money::new(dec!(4.25), Currency::EUR);

    assert_eq!(a.checked_add(&b).unwrap().amount(), dec!(14.75));
    assert_eq!(a.checked_sub(&b).unwrap().amount(), dec!(6.25));
}

#[test]
fn test_cross_currency_arithmetic_is_an_error() {
    let usd = Money::new(dec!(10), Currency::USD);
    let jpy = Money::new(dec!(10), Currency::JPY);

    assert!(matches!(
        usd.checked_add(&jpy),
        Err(MoneyError::CurrencyMismatch(_, _))
    ));
    assert!(matches!(
        usd.checked_sub(&jpy),
        Err(MoneyError::CurrencyMismatch(_, _))
    ));
}

#[test]
fn test_multiply_by_quantity() {
    let unit = Money::new(dec!(4.99), Currency::USD);
    assert_eq!(unit.multiply(dec!(3)).amount(), dec!(14.97));
}

#[test]
fn test_abs_and_negation() {
    let m = Money::new(dec!(-12.5), Currency::GBP);
    assert!(m.is_negative());
    assert_eq!(m.abs().amount(), dec!(12.5));
    assert_eq!((-m).amount(), dec!(12.5));
}

#[test]
fn test_round_to_currency() {
    let m = Money::new(dec!(9.999), Currency::USD);
    assert_eq!(m.round_to_currency().amount(), dec!(10.00));

    let y = Money::new(dec!(9.5), Currency::JPY);
    assert_eq!(y.round_to_currency().amount(), dec!(10));
}

proptest! {
    #[test]
    fn prop_addition_preserves_currency(cents_a in -1_000_000i64..1_000_000, cents_b in -1_000_000i64..1_000_000) {
        let a = Money::from_minor(cents_a, Currency::USD);
        let b = Money::from_minor(cents_b, Currency::USD);
        let sum = a.checked_add(&b).unwrap();
        prop_assert_eq!(sum.currency(), Currency::USD);
        prop_assert_eq!(sum.amount(), a.amount() + b.amount());
    }

    #[test]
    fn prop_subtraction_inverts_addition(cents_a in -1_000_000i64..1_000_000, cents_b in -1_000_000i64..1_000_000) {
        let a = Money::from_minor(cents_a, Currency::USD);
        let b = Money::from_minor(cents_b, Currency::USD);
        let round_trip = a.checked_add(&b).unwrap().checked_sub(&b).unwrap();
        prop_assert_eq!(round_trip.amount(), a.amount());
    }
}

#[test]
fn test_display_formats() {
    assert_eq!(Money::new(dec!(19.9), Currency::USD).to_string(), "USD 19.90");
    assert_eq!(Money::new(dec!(500), Currency::JPY).to_string(), "JPY 500");
}

#[test]
fn test_decimal_passthrough() {
    let m = Money::new(Decimal::new(12345, 2), Currency::EUR);
    assert_eq!(m.amount(), dec!(123.45));
}
