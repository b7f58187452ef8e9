pub mod ratio;
pub mod tick;

use alloy::primitives::U256;

/// Widening conversion for balances and sqrt prices that can exceed u128.
pub fn u256_to_f64(x: U256) -> f64 {
    x.as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 2f64.powi(64) + limb as f64)
}

/// Human-readable token amount from raw units.
pub fn to_human(units: U256, decimals: u8) -> f64 {
    u256_to_f64(units) / 10f64.powi(decimals as i32)
}

/// Raw token units from a human amount. Used only for swap sizing, where
/// f64 precision is acceptable; minimum-output bounds come from quotes.
pub fn to_raw(amount: f64, decimals: u8) -> U256 {
    if amount <= 0.0 {
        return U256::ZERO;
    }
    U256::from((amount * 10f64.powi(decimals as i32)) as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_round_trips_small_values() {
        assert_eq!(u256_to_f64(U256::from(0u64)), 0.0);
        assert_eq!(u256_to_f64(U256::from(1_234_567u64)), 1_234_567.0);
    }

    #[test]
    fn u256_handles_values_above_u128() {
        let big = U256::from(1u64) << 140;
        let expected = 2f64.powi(140);
        let got = u256_to_f64(big);
        assert!((got - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn human_raw_conversions() {
        assert_eq!(to_raw(1.5, 6), U256::from(1_500_000u64));
        assert_eq!(to_raw(0.0, 18), U256::ZERO);
        assert_eq!(to_raw(-3.0, 18), U256::ZERO);
        let h = to_human(U256::from(1_500_000u64), 6);
        assert!((h - 1.5).abs() < 1e-12);
    }
}
