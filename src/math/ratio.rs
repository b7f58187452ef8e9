use alloy::primitives::U256;

use crate::math::tick::{TickRange, sqrt_price_from_x96, tick_to_sqrt_price};

/// How a position's capital should be split between the pair for a given
/// range at the current price. Ratios are value fractions summing to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioResult {
    pub token0_ratio: f64,
    pub token1_ratio: f64,
    pub in_range: bool,
    pub below_range: bool,
}

impl RatioResult {
    pub fn above_range(&self) -> bool {
        !self.in_range && !self.below_range
    }
}

/// token1-per-token0 price in decimal-adjusted units. Diagnostics and ratio
/// math only; never used to derive minimum-output bounds.
pub fn human_price(tick: i32, dec0: u8, dec1: u8) -> f64 {
    1.0001_f64.powi(tick) * 10f64.powi(dec0 as i32 - dec1 as i32)
}

/// Value split required by a tick range at the current price.
///
/// Entirely below the range means the position holds only token0 (price must
/// rise to enter); entirely above means only token1. In between, the raw
/// amount ratio follows from the standard liquidity formulas and is converted
/// to value fractions at the current human price. When `sqrt_price_x96` is
/// provided the on-chain integer drives the math instead of the tick.
pub fn ratio_for_range(
    current_tick: i32,
    sqrt_price_x96: Option<U256>,
    range: TickRange,
    dec0: u8,
    dec1: u8,
) -> RatioResult {
    if current_tick < range.lower {
        return RatioResult {
            token0_ratio: 1.0,
            token1_ratio: 0.0,
            in_range: false,
            below_range: true,
        };
    }
    if current_tick > range.upper {
        return RatioResult {
            token0_ratio: 0.0,
            token1_ratio: 1.0,
            in_range: false,
            below_range: false,
        };
    }
    if current_tick == range.lower {
        // Exact lower bound: the denominator √cur − √lower vanishes and the
        // limit of the formula is all token0.
        return RatioResult {
            token0_ratio: 1.0,
            token1_ratio: 0.0,
            in_range: true,
            below_range: false,
        };
    }

    let sqrt_cur = sqrt_price_x96
        .map(sqrt_price_from_x96)
        .unwrap_or_else(|| tick_to_sqrt_price(current_tick));
    let sqrt_lower = tick_to_sqrt_price(range.lower);
    let sqrt_upper = tick_to_sqrt_price(range.upper);

    // Raw amount0/amount1 for one unit of liquidity at the current price.
    let raw_ratio = (1.0 / sqrt_cur - 1.0 / sqrt_upper) / (sqrt_cur - sqrt_lower);
    let human_ratio = raw_ratio * 10f64.powi(dec1 as i32 - dec0 as i32);

    let price = sqrt_cur * sqrt_cur * 10f64.powi(dec0 as i32 - dec1 as i32);
    let value0 = human_ratio * price;
    let value1 = 1.0;
    let total = value0 + value1;

    RatioResult {
        token0_ratio: value0 / total,
        token1_ratio: value1 / total,
        in_range: true,
        below_range: false,
    }
}

/// Token amounts a liquidity figure represents at the current price.
/// Standard three-branch V3 math in doubles; observability only — on-chain
/// slippage bounds always come from quoter output.
pub fn amounts_for_liquidity(
    liquidity: u128,
    current_tick: i32,
    range: TickRange,
) -> (f64, f64) {
    let liquidity = liquidity as f64;
    let sqrt_lower = tick_to_sqrt_price(range.lower);
    let sqrt_upper = tick_to_sqrt_price(range.upper);

    if current_tick < range.lower {
        let amount0 = liquidity * (1.0 / sqrt_lower - 1.0 / sqrt_upper);
        (amount0, 0.0)
    } else if current_tick >= range.upper {
        let amount1 = liquidity * (sqrt_upper - sqrt_lower);
        (0.0, amount1)
    } else {
        let sqrt_cur = tick_to_sqrt_price(current_tick);
        let amount0 = liquidity * (1.0 / sqrt_cur - 1.0 / sqrt_upper);
        let amount1 = liquidity * (sqrt_cur - sqrt_lower);
        (amount0, amount1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: TickRange = TickRange {
        lower: -196_440,
        upper: -196_200,
    };

    #[test]
    fn below_range_is_all_token0() {
        let r = ratio_for_range(-196_800, None, RANGE, 9, 6);
        assert_eq!(r.token0_ratio, 1.0);
        assert_eq!(r.token1_ratio, 0.0);
        assert!(r.below_range);
        assert!(!r.in_range);
    }

    #[test]
    fn above_range_is_all_token1() {
        let r = ratio_for_range(-196_000, None, RANGE, 9, 6);
        assert_eq!(r.token0_ratio, 0.0);
        assert_eq!(r.token1_ratio, 1.0);
        assert!(r.above_range());
        assert!(!r.in_range);
    }

    // Sitting exactly on a bound stays in range and degenerates to one
    // side, with no NaN from the vanishing denominator.
    #[test]
    fn range_bounds_degenerate_cleanly() {
        let lower = ratio_for_range(RANGE.lower, None, RANGE, 9, 6);
        assert_eq!(lower.token0_ratio, 1.0);
        assert_eq!(lower.token1_ratio, 0.0);
        assert!(lower.in_range);
        assert!(!lower.below_range);

        let upper = ratio_for_range(RANGE.upper, None, RANGE, 9, 6);
        assert!(upper.token0_ratio.abs() < 1e-9, "got {}", upper.token0_ratio);
        assert!((upper.token1_ratio - 1.0).abs() < 1e-9);
        assert!(upper.in_range);
        assert!(upper.token0_ratio.is_finite() && upper.token1_ratio.is_finite());
    }

    #[test]
    fn in_range_ratios_sum_to_one() {
        let r = ratio_for_range(-196_320, None, RANGE, 9, 6);
        assert!(r.in_range);
        assert!(!r.below_range);
        assert!(r.token0_ratio > 0.0 && r.token0_ratio < 1.0);
        assert!((r.token0_ratio + r.token1_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn centered_symmetric_range_splits_near_half() {
        // At the exact center of a symmetric range the value split is close
        // to 50/50 (not exact: amount ratios are not linear in ticks).
        let range = TickRange { lower: -600, upper: 600 };
        let r = ratio_for_range(0, None, range, 18, 18);
        assert!((r.token0_ratio - 0.5).abs() < 0.01, "got {}", r.token0_ratio);
    }

    // Raising the lower bound toward the current tick shrinks the token1
    // segment of the range, so the token0 value share grows strictly.
    #[test]
    fn ratio_monotonic_in_lower_bound() {
        let current = 0;
        let mut prev = -1.0;
        for lower in [-6000, -3000, -1200, -600, -60] {
            let r = ratio_for_range(
                current,
                None,
                TickRange { lower, upper: 6000 },
                18,
                18,
            );
            assert!(
                r.token0_ratio > prev,
                "token0_ratio should grow as lower rises: {} !> {}",
                r.token0_ratio,
                prev
            );
            prev = r.token0_ratio;
        }
    }

    // Symmetric: dropping the upper bound toward the current tick grows
    // the token1 value share.
    #[test]
    fn ratio_monotonic_in_upper_bound() {
        let current = 0;
        let mut prev = -1.0;
        for upper in [6000, 3000, 1200, 600, 60] {
            let r = ratio_for_range(
                current,
                None,
                TickRange { lower: -6000, upper },
                18,
                18,
            );
            assert!(
                r.token1_ratio > prev,
                "token1_ratio should grow as upper drops: {} !> {}",
                r.token1_ratio,
                prev
            );
            prev = r.token1_ratio;
        }
    }

    #[test]
    fn onchain_sqrt_price_is_preferred() {
        // sqrtPriceX96 for tick 0 is exactly 2^96; feeding a slightly
        // different integer should shift the result.
        let x96 = U256::from(1u64) << 96;
        let range = TickRange { lower: -600, upper: 600 };
        let a = ratio_for_range(0, Some(x96), range, 18, 18);
        let b = ratio_for_range(0, None, range, 18, 18);
        assert!((a.token0_ratio - b.token0_ratio).abs() < 1e-9);
    }

    #[test]
    fn amounts_three_branches() {
        let range = TickRange { lower: -600, upper: 600 };
        let l = 1_000_000_000_000u128;

        let (a0, a1) = amounts_for_liquidity(l, -1200, range);
        assert!(a0 > 0.0 && a1 == 0.0);

        let (a0, a1) = amounts_for_liquidity(l, 1200, range);
        assert!(a0 == 0.0 && a1 > 0.0);

        let (a0, a1) = amounts_for_liquidity(l, 0, range);
        assert!(a0 > 0.0 && a1 > 0.0);
    }

    #[test]
    fn human_price_decimal_adjustment() {
        // tick 0 means raw parity; 9/6 decimals put the human price at 1000.
        let p = human_price(0, 9, 6);
        assert!((p - 1000.0).abs() < 1e-9);
        let p = human_price(0, 6, 6);
        assert!((p - 1.0).abs() < 1e-12);
    }
}
