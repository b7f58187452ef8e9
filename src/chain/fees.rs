use crate::config::{Config, GasStrategy};

/// Computed per-transaction gas pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasFees {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

/// EIP-1559 fee computation with a configured ceiling, plus a legacy
/// single-price path for chains that lack the fee market.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    strategy: GasStrategy,
    max_gas_price_wei: Option<u128>,
    priority_fee_wei: u128,
}

pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * 1e9) as u128
}

impl FeePolicy {
    pub fn from_config(config: &Config) -> Self {
        FeePolicy {
            strategy: config.gas_strategy,
            max_gas_price_wei: config.max_gas_price_gwei.map(gwei_to_wei),
            priority_fee_wei: gwei_to_wei(config.priority_fee_gwei),
        }
    }

    pub fn strategy(&self) -> GasStrategy {
        self.strategy
    }

    /// Price a transaction from the latest observed base fee (auto) or the
    /// node's suggested gas price (legacy).
    ///
    /// Invariant: `max_priority_fee_per_gas <= max_fee_per_gas` on every
    /// output. When the ceiling forces the max fee below the configured
    /// priority fee, the priority fee is clamped down to match — otherwise
    /// the node rejects the transaction outright.
    pub fn compute(&self, base_fee: u128, node_gas_price: u128) -> GasFees {
        match self.strategy {
            GasStrategy::Auto => {
                let mut priority = self.priority_fee_wei;
                let mut max_fee = base_fee.saturating_add(priority);
                if let Some(cap) = self.max_gas_price_wei {
                    if max_fee > cap {
                        max_fee = cap;
                    }
                    if priority > max_fee {
                        println!(
                            "  FEES: warning: MAX_GAS_PRICE cap {} wei below priority fee {} wei, clamping priority",
                            max_fee, priority
                        );
                        priority = max_fee;
                    }
                }
                GasFees::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority,
                }
            }
            GasStrategy::Legacy => {
                let mut price = node_gas_price.max(base_fee);
                if let Some(cap) = self.max_gas_price_wei {
                    price = price.min(cap);
                }
                GasFees::Legacy { gas_price: price }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: GasStrategy, cap_wei: Option<u128>, priority_wei: u128) -> FeePolicy {
        FeePolicy {
            strategy,
            max_gas_price_wei: cap_wei,
            priority_fee_wei: priority_wei,
        }
    }

    fn assert_valid(fees: GasFees) {
        if let GasFees::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } = fees
        {
            assert!(
                max_priority_fee_per_gas <= max_fee_per_gas,
                "priority {} exceeds max {}",
                max_priority_fee_per_gas,
                max_fee_per_gas
            );
        }
    }

    #[test]
    fn auto_adds_priority_to_base() {
        let p = policy(GasStrategy::Auto, None, 1_000_000);
        let fees = p.compute(50_000_000, 0);
        assert_eq!(
            fees,
            GasFees::Eip1559 {
                max_fee_per_gas: 51_000_000,
                max_priority_fee_per_gas: 1_000_000,
            }
        );
    }

    #[test]
    fn cap_clamps_max_fee_and_priority() {
        // Cap below even the priority fee: both must collapse to the cap.
        let p = policy(GasStrategy::Auto, Some(500), 1_000_000);
        let fees = p.compute(50_000_000, 0);
        assert_eq!(
            fees,
            GasFees::Eip1559 {
                max_fee_per_gas: 500,
                max_priority_fee_per_gas: 500,
            }
        );
    }

    // Priority never exceeds max fee, across a sweep of extreme inputs.
    #[test]
    fn priority_never_exceeds_max_fee() {
        let bases = [0u128, 1, 1_000, 10u128.pow(9), 10u128.pow(15), 10u128.pow(18)];
        let caps = [0u128, 1, 10u128.pow(6), 10u128.pow(12), 10u128.pow(18)];
        let priorities = [0u128, 1_000_000, 10u128.pow(12), 10u128.pow(18)];
        for &base in &bases {
            for &prio in &priorities {
                assert_valid(policy(GasStrategy::Auto, None, prio).compute(base, 0));
                for &cap in &caps {
                    assert_valid(policy(GasStrategy::Auto, Some(cap), prio).compute(base, 0));
                }
            }
        }
    }

    #[test]
    fn legacy_uses_capped_node_price() {
        let p = policy(GasStrategy::Legacy, Some(2_000), 0);
        assert_eq!(p.compute(0, 5_000), GasFees::Legacy { gas_price: 2_000 });
        assert_eq!(p.compute(0, 1_500), GasFees::Legacy { gas_price: 1_500 });
        // Falls back to base fee when it exceeds the node estimate.
        assert_eq!(p.compute(1_800, 100), GasFees::Legacy { gas_price: 1_800 });
    }

    #[test]
    fn gwei_conversion() {
        assert_eq!(gwei_to_wei(1.0), 1_000_000_000);
        assert_eq!(gwei_to_wei(0.001), 1_000_000);
    }
}
