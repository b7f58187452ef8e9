use alloy::primitives::U256;

use crate::error::KeeperError;
use crate::math::u256_to_f64;

/// Chain-defined tick bounds shared by all V3-style pools.
pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// Base half-width in ticks for a freshly centered range, before the
/// configured multiplier is applied.
const BASE_HALF_WIDTH_TICKS: f64 = 30.0;

/// An aligned, ordered tick range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    /// In-range test: `lower <= tick < upper`.
    pub fn contains(&self, tick: i32) -> bool {
        self.lower <= tick && tick < self.upper
    }

    pub fn width(&self) -> i32 {
        self.upper - self.lower
    }
}

impl std::fmt::Display for TickRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Floor,
    Ceil,
}

/// sqrt(1.0001^tick) = 1.0001^(tick/2)
pub fn tick_to_sqrt_price(tick: i32) -> f64 {
    1.0001_f64.powf(tick as f64 / 2.0)
}

/// Decode an on-chain Q64.96 sqrt price into a plain double. Preferred over
/// the tick-derived value whenever slot0 is at hand.
pub fn sqrt_price_from_x96(sqrt_price_x96: U256) -> f64 {
    u256_to_f64(sqrt_price_x96) / 2f64.powi(96)
}

/// Snap a tick to the pool grid. Euclidean division keeps floor/ceil
/// behavior correct for negative ticks; the result is clamped to the
/// aligned ends of [MIN_TICK, MAX_TICK].
pub fn align_to_spacing(tick: i32, spacing: i32, align: Align) -> i32 {
    debug_assert!(spacing > 0);
    let aligned = match align {
        Align::Floor => tick.div_euclid(spacing) * spacing,
        Align::Ceil => -((-tick).div_euclid(spacing)) * spacing,
    };
    // Largest grid points inside the chain bounds (MAX_TICK == -MIN_TICK).
    let bound = MAX_TICK.div_euclid(spacing) * spacing;
    aligned.clamp(-bound, bound)
}

/// Center a new range around `current_tick`. Half-width is the 30-tick base
/// heuristic scaled by the configured multiplier, with both ends snapped
/// outward to the pool grid.
pub fn compute_new_range(
    current_tick: i32,
    spacing: i32,
    range_multiplier: f64,
) -> Result<TickRange, KeeperError> {
    if spacing <= 0 {
        return Err(KeeperError::InvalidRange(format!(
            "tick spacing {spacing} must be positive"
        )));
    }
    let half_width = (BASE_HALF_WIDTH_TICKS * range_multiplier).round() as i32;
    let lower = align_to_spacing(current_tick - half_width, spacing, Align::Floor);
    let upper = align_to_spacing(current_tick + half_width, spacing, Align::Ceil);
    if lower >= upper {
        return Err(KeeperError::InvalidRange(format!(
            "range collapsed at tick {current_tick} (spacing {spacing}, multiplier {range_multiplier})"
        )));
    }
    Ok(TickRange { lower, upper })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_floor_and_ceil_on_negative_ticks() {
        assert_eq!(align_to_spacing(-196_475, 60, Align::Floor), -196_500);
        assert_eq!(align_to_spacing(-196_475, 60, Align::Ceil), -196_440);
        assert_eq!(align_to_spacing(-196_500, 60, Align::Floor), -196_500);
        assert_eq!(align_to_spacing(-196_500, 60, Align::Ceil), -196_500);
    }

    #[test]
    fn align_floor_and_ceil_on_positive_ticks() {
        assert_eq!(align_to_spacing(125, 60, Align::Floor), 120);
        assert_eq!(align_to_spacing(125, 60, Align::Ceil), 180);
        assert_eq!(align_to_spacing(120, 60, Align::Floor), 120);
        assert_eq!(align_to_spacing(120, 60, Align::Ceil), 120);
    }

    #[test]
    fn align_is_idempotent_when_already_aligned() {
        for &spacing in &[1, 10, 60, 200] {
            for t in (-1000..1000).step_by(37) {
                let floored = align_to_spacing(t, spacing, Align::Floor);
                assert_eq!(align_to_spacing(floored, spacing, Align::Ceil), floored);
                assert_eq!(align_to_spacing(floored, spacing, Align::Floor), floored);
            }
        }
    }

    #[test]
    fn align_clamps_to_chain_bounds() {
        let t = align_to_spacing(MAX_TICK, 60, Align::Ceil);
        assert!(t <= MAX_TICK);
        assert_eq!(t % 60, 0);
        let t = align_to_spacing(MIN_TICK, 60, Align::Floor);
        assert!(t >= MIN_TICK);
        assert_eq!(t % 60, 0);
    }

    // Drift scenario: out-of-range position at spacing 60 recentered with
    // multiplier 2.6 lands exactly two spacings either side.
    #[test]
    fn new_range_recenters_around_current_tick() {
        let range = compute_new_range(-196_320, 60, 2.6).unwrap();
        assert_eq!(range.lower, -196_440);
        assert_eq!(range.upper, -196_200);
        assert!(range.contains(-196_320));
    }

    #[test]
    fn new_range_alignment_invariants() {
        for &spacing in &[1, 10, 50, 60, 100, 200] {
            for tick in (-300_000..300_000).step_by(7_919) {
                let range = compute_new_range(tick, spacing, 2.6).unwrap();
                assert_eq!(range.lower.rem_euclid(spacing), 0);
                assert_eq!(range.upper.rem_euclid(spacing), 0);
                assert!(range.lower < range.upper);
                assert!(range.lower <= tick && tick <= range.upper);
                assert!(range.lower >= MIN_TICK && range.upper <= MAX_TICK);
            }
        }
    }

    #[test]
    fn new_range_rejects_bad_spacing() {
        assert!(compute_new_range(0, 0, 2.6).is_err());
        assert!(compute_new_range(0, -60, 2.6).is_err());
    }

    #[test]
    fn sqrt_price_conversions_agree() {
        // 2^96 encodes sqrt price 1.0 (tick 0).
        let one_x96 = U256::from(1u64) << 96;
        assert!((sqrt_price_from_x96(one_x96) - 1.0).abs() < 1e-15);
        assert!((tick_to_sqrt_price(0) - 1.0).abs() < 1e-15);

        let tick = -196_320;
        let sp = tick_to_sqrt_price(tick);
        assert!((sp * sp - 1.0001_f64.powi(tick)).abs() / 1.0001_f64.powi(tick) < 1e-9);
    }
}
