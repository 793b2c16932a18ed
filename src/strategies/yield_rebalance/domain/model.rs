use chrono::{DateTime, Utc};
use serde::Serialize;

pub use crate::core::types::ExecutionStep;
use crate::core::types::{Address, TransactionHash};

/// 单个协议的收益率报价
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolQuote {
    pub protocol_address: Address,
    pub token_address: Address,
    pub apy: f64,
    pub is_stablecoin: bool,
}

/// 一个周期内共享的报价快照，按到达顺序保存，按协议地址去重
#[derive(Debug, Clone)]
pub struct QuoteSnapshot {
    quotes: Vec<ProtocolQuote>,
    captured_at: DateTime<Utc>,
}

impl QuoteSnapshot {
    /// 构建快照，重复的协议地址保留第一次出现的报价
    pub fn new(quotes: Vec<ProtocolQuote>) -> Self {
        let mut deduped: Vec<ProtocolQuote> = Vec::with_capacity(quotes.len());
        for quote in quotes {
            if deduped
                .iter()
                .any(|q| q.protocol_address == quote.protocol_address)
            {
                log::warn!(
                    "[rebalance] 忽略重复的协议报价: {} (apy={})",
                    quote.protocol_address,
                    quote.apy
                );
                continue;
            }
            deduped.push(quote);
        }

        Self {
            quotes: deduped,
            captured_at: Utc::now(),
        }
    }

    pub fn quotes(&self) -> &[ProtocolQuote] {
        &self.quotes
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn get(&self, protocol: &Address) -> Option<&ProtocolQuote> {
        self.quotes.iter().find(|q| &q.protocol_address == protocol)
    }

    pub fn protocols(&self) -> impl Iterator<Item = &Address> {
        self.quotes.iter().map(|q| &q.protocol_address)
    }
}

/// 用户在某个协议中的质押仓位
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakedPosition {
    pub owner_address: Address,
    pub protocol_address: Address,
    pub token_address: Address,
    /// 可读数量
    pub amount: f64,
    /// 链上原始数量
    pub raw_amount: u128,
}

/// 调仓计划：把一个仓位从当前协议迁移到更优协议
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalancePlan {
    pub owner: Address,
    pub from_protocol: Address,
    pub token_in: Address,
    pub to_protocol: Address,
    pub token_out: Address,
    pub amount: f64,
    pub raw_amount: u128,
}

impl RebalancePlan {
    pub fn requires_swap(&self) -> bool {
        self.token_in != self.token_out
    }
}

/// 单个计划的执行回执
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReceipt {
    pub plan: RebalancePlan,
    pub steps: Vec<(ExecutionStep, TransactionHash)>,
}

impl ExecutionReceipt {
    /// 最终质押交易的哈希
    pub fn transaction_id(&self) -> Option<&TransactionHash> {
        self.steps
            .iter()
            .rev()
            .find(|(step, _)| *step == ExecutionStep::Stake)
            .map(|(_, hash)| hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tail: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", tail)).unwrap()
    }

    fn quote(protocol: &str, apy: f64) -> ProtocolQuote {
        ProtocolQuote {
            protocol_address: addr(protocol),
            token_address: addr("aa"),
            apy,
            is_stablecoin: true,
        }
    }

    #[test]
    fn snapshot_keeps_first_seen_duplicate() {
        let snapshot = QuoteSnapshot::new(vec![quote("1", 3.0), quote("2", 4.0), quote("1", 9.0)]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&addr("1")).unwrap().apy, 3.0);
        let order: Vec<_> = snapshot.protocols().cloned().collect();
        assert_eq!(order, vec![addr("1"), addr("2")]);
    }

    #[test]
    fn receipt_transaction_id_is_stake_hash() {
        let plan = RebalancePlan {
            owner: addr("3"),
            from_protocol: addr("1"),
            token_in: addr("aa"),
            to_protocol: addr("2"),
            token_out: addr("aa"),
            amount: 1.0,
            raw_amount: 1_000_000,
        };
        assert!(!plan.requires_swap());

        let receipt = ExecutionReceipt {
            plan,
            steps: vec![
                (ExecutionStep::Unstake, "0x01".to_string()),
                (ExecutionStep::ApproveStake, "0x02".to_string()),
                (ExecutionStep::Stake, "0x03".to_string()),
            ],
        };
        assert_eq!(receipt.transaction_id().map(String::as_str), Some("0x03"));
    }

    #[test]
    fn step_methods_match_contract_abi() {
        assert_eq!(ExecutionStep::Unstake.method(), "withdrawAll");
        assert_eq!(ExecutionStep::ApproveStake.method(), "approve");
        assert_eq!(ExecutionStep::ApproveSwap.to_string(), "approve_swap");
    }
}
