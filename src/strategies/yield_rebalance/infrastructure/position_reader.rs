use std::sync::Arc;

use futures_util::future::join_all;

use crate::core::error::RebalanceError;
use crate::core::types::{scale_amount, Address};
use crate::strategies::yield_rebalance::domain::model::{QuoteSnapshot, StakedPosition};

use super::chain_reader::ChainReader;

/// 一次仓位读取的结果：成功的仓位 + 读取失败的协议
#[derive(Debug, Default)]
pub struct PositionReadout {
    pub positions: Vec<StakedPosition>,
    pub failed_protocols: Vec<(Address, RebalanceError)>,
}

/// 按快照中的协议列表读取用户的质押仓位
#[derive(Clone)]
pub struct PositionReader {
    chain: Arc<dyn ChainReader>,
    decimals: u32,
}

impl PositionReader {
    pub fn new(chain: Arc<dyn ChainReader>, decimals: u32) -> Self {
        Self { chain, decimals }
    }

    /// `owner` 为用户地址，`chain_address` 为实际持有质押的托管钱包地址
    pub async fn read_positions(
        &self,
        owner: &Address,
        chain_address: &Address,
        snapshot: &QuoteSnapshot,
    ) -> PositionReadout {
        let reads = snapshot.quotes().iter().map(|quote| {
            let chain = self.chain.clone();
            async move {
                let result = chain
                    .staked_amount(&quote.protocol_address, chain_address)
                    .await;
                (quote, result)
            }
        });

        let mut readout = PositionReadout::default();
        // join_all 保持快照顺序
        for (quote, result) in join_all(reads).await {
            match result {
                Ok(0) => {}
                Ok(raw_amount) => {
                    let amount = scale_amount(raw_amount, self.decimals);
                    readout.positions.push(StakedPosition {
                        owner_address: owner.clone(),
                        protocol_address: quote.protocol_address.clone(),
                        token_address: quote.token_address.clone(),
                        amount,
                        raw_amount,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "[rebalance] 读取 {} 在协议 {} 的仓位失败: {}",
                        owner,
                        quote.protocol_address,
                        err
                    );
                    readout
                        .failed_protocols
                        .push((quote.protocol_address.clone(), err));
                }
            }
        }

        readout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Result;
    use crate::strategies::yield_rebalance::domain::model::ProtocolQuote;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn addr(tail: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", tail)).unwrap()
    }

    struct FakeChain {
        balances: HashMap<Address, u128>,
        broken: Vec<Address>,
    }

    #[async_trait]
    impl ChainReader for FakeChain {
        async fn staked_amount(&self, protocol: &Address, _user: &Address) -> Result<u128> {
            if self.broken.contains(protocol) {
                return Err(RebalanceError::ChainReadError {
                    protocol: protocol.clone(),
                    reason: "execution reverted".to_string(),
                });
            }
            Ok(self.balances.get(protocol).copied().unwrap_or(0))
        }
    }

    fn quote(protocol: &str, token: &str) -> ProtocolQuote {
        ProtocolQuote {
            protocol_address: addr(protocol),
            token_address: addr(token),
            apy: 1.0,
            is_stablecoin: true,
        }
    }

    #[tokio::test]
    async fn returns_positive_balances_and_isolates_failures() {
        let mut balances = HashMap::new();
        balances.insert(addr("a1"), 2_500_000);
        balances.insert(addr("a3"), 7_000_000);
        let chain = FakeChain {
            balances,
            broken: vec![addr("a2")],
        };
        let reader = PositionReader::new(Arc::new(chain), 6);
        let snapshot = QuoteSnapshot::new(vec![
            quote("a1", "c1"),
            quote("a2", "c1"),
            quote("a3", "c2"),
            quote("a4", "c2"),
        ]);

        let readout = reader
            .read_positions(&addr("1"), &addr("2"), &snapshot)
            .await;

        assert_eq!(readout.positions.len(), 2);
        assert_eq!(readout.positions[0].protocol_address, addr("a1"));
        assert_eq!(readout.positions[0].amount, 2.5);
        assert_eq!(readout.positions[0].owner_address, addr("1"));
        assert_eq!(readout.positions[1].token_address, addr("c2"));
        assert_eq!(readout.positions[1].raw_amount, 7_000_000);

        assert_eq!(readout.failed_protocols.len(), 1);
        assert_eq!(readout.failed_protocols[0].0, addr("a2"));
    }
}
