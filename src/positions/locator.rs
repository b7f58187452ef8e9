use alloy::primitives::Address;

use crate::chain::ChainClient;
use crate::chain::contracts::ICLFactory;
use crate::error::KeeperError;

/// Resolve a pool address for a token pair by scanning the configured
/// (factory × fee-tier) tuples in order. First non-zero result wins; the
/// configured ordering is authoritative. `None` means the pair is
/// unclassifiable this cycle and the caller skips it.
pub async fn find_pool(
    client: &ChainClient,
    factories: &[Address],
    fee_tiers: &[u32],
    token_a: Address,
    token_b: Address,
) -> Result<Option<Address>, KeeperError> {
    for &factory_address in factories {
        let factory = ICLFactory::new(factory_address, client.provider());
        for &fee in fee_tiers {
            let pool = client
                .read("factory.getPool", || async {
                    factory
                        .getPool(token_a, token_b, alloy::primitives::Uint::<24, 1>::from(fee))
                        .call()
                        .await
                })
                .await?;
            if pool != Address::ZERO {
                return Ok(Some(pool));
            }
        }
    }
    Ok(None)
}
