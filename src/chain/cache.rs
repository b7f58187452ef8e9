use std::collections::HashMap;

use alloy::primitives::Address;

/// Observed ERC-20 metadata. Immutable once seen.
#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
}

/// Structural pool fields. `slot0` is deliberately absent — it changes
/// every block and is read fresh each cycle.
#[derive(Debug, Clone, Copy)]
pub struct PoolMeta {
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub fee: u32,
}

/// Append-only metadata caches. Invalidation is never required for
/// correctness; a miss just costs one extra round of reads.
#[derive(Debug, Default)]
pub struct MetaCache {
    tokens: HashMap<Address, TokenMeta>,
    pools: HashMap<Address, PoolMeta>,
}

impl MetaCache {
    pub fn token(&self, address: Address) -> Option<&TokenMeta> {
        self.tokens.get(&address)
    }

    pub fn insert_token(&mut self, address: Address, meta: TokenMeta) -> &TokenMeta {
        self.tokens.entry(address).or_insert(meta)
    }

    pub fn pool(&self, address: Address) -> Option<&PoolMeta> {
        self.pools.get(&address)
    }

    pub fn insert_pool(&mut self, address: Address, meta: PoolMeta) -> &PoolMeta {
        self.pools.entry(address).or_insert(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_first_write_wins() {
        let mut cache = MetaCache::default();
        let addr = Address::repeat_byte(1);
        cache.insert_token(
            addr,
            TokenMeta { symbol: "USDC".into(), decimals: 6 },
        );
        // A second insert for the same address must not clobber the first
        // observation — cached structural data is immutable.
        cache.insert_token(
            addr,
            TokenMeta { symbol: "BOGUS".into(), decimals: 18 },
        );
        assert_eq!(cache.token(addr).unwrap().symbol, "USDC");
        assert_eq!(cache.token(addr).unwrap().decimals, 6);
    }

    #[test]
    fn miss_returns_none() {
        let cache = MetaCache::default();
        assert!(cache.token(Address::ZERO).is_none());
        assert!(cache.pool(Address::ZERO).is_none());
    }
}
