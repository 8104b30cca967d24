//! Bridges `alloy_primitives::U256` (wire/contract domain) to
//! `sqlx::types::BigDecimal` (`NUMERIC(78,0)` on the wire) losslessly via
//! decimal-string round-tripping. `rust_decimal`'s 96-bit mantissa tops out
//! around 29 significant digits, short of the 78 digits a full `U256` can
//! need, so the arbitrary-precision `bigdecimal` crate backs these columns
//! instead (the pack's other arbitrary-precision numeric stack, e.g.
//! `aptos-labs/aptos-core`'s `bigdecimal` dependency).

use alloy_primitives::U256;
use bigdecimal::BigDecimal;
use std::str::FromStr;

pub fn u256_to_decimal(value: U256) -> BigDecimal {
    BigDecimal::from_str(&value.to_string())
        .expect("U256 decimal string always parses as BigDecimal")
}

pub fn decimal_to_u256(value: BigDecimal) -> U256 {
    U256::from_str(&value.with_scale(0).to_string()).expect("stored transfer amounts fit in U256")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_small_values() {
        let value = U256::from(12345u64);
        assert_eq!(decimal_to_u256(u256_to_decimal(value)), value);
    }

    #[test]
    fn round_trips_max_u256() {
        let value = U256::MAX;
        assert_eq!(decimal_to_u256(u256_to_decimal(value)), value);
    }

    #[test]
    fn round_trips_zero() {
        let value = U256::ZERO;
        assert_eq!(decimal_to_u256(u256_to_decimal(value)), value);
    }
}
