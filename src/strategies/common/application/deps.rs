use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::strategies::yield_rebalance::infrastructure::chain_reader::ChainReader;
use crate::strategies::yield_rebalance::infrastructure::custody::CustodyClient;
use crate::strategies::yield_rebalance::infrastructure::wallet_store::WalletStore;
use crate::strategies::yield_rebalance::infrastructure::yield_oracle::YieldOracle;
use crate::utils::webhook::WebhookNotifier;

/// 统一的策略依赖容器（外部协作方）
#[derive(Clone)]
pub struct StrategyDeps {
    pub wallet_store: Arc<dyn WalletStore>,
    pub yield_oracle: Arc<dyn YieldOracle>,
    pub chain_reader: Arc<dyn ChainReader>,
    pub custody: Arc<dyn CustodyClient>,
    pub notifier: Option<Arc<WebhookNotifier>>,
}

impl StrategyDeps {
    pub fn builder() -> StrategyDepsBuilder {
        StrategyDepsBuilder::default()
    }
}

/// 构建策略依赖的辅助结构
#[derive(Default)]
pub struct StrategyDepsBuilder {
    wallet_store: Option<Arc<dyn WalletStore>>,
    yield_oracle: Option<Arc<dyn YieldOracle>>,
    chain_reader: Option<Arc<dyn ChainReader>>,
    custody: Option<Arc<dyn CustodyClient>>,
    notifier: Option<Arc<WebhookNotifier>>,
}

impl StrategyDepsBuilder {
    pub fn with_wallet_store(mut self, store: Arc<dyn WalletStore>) -> Self {
        self.wallet_store = Some(store);
        self
    }

    pub fn with_yield_oracle(mut self, oracle: Arc<dyn YieldOracle>) -> Self {
        self.yield_oracle = Some(oracle);
        self
    }

    pub fn with_chain_reader(mut self, chain: Arc<dyn ChainReader>) -> Self {
        self.chain_reader = Some(chain);
        self
    }

    pub fn with_custody(mut self, custody: Arc<dyn CustodyClient>) -> Self {
        self.custody = Some(custody);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<WebhookNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<StrategyDeps> {
        Ok(StrategyDeps {
            wallet_store: self
                .wallet_store
                .ok_or_else(|| anyhow!("StrategyDeps 缺少 wallet_store"))?,
            yield_oracle: self
                .yield_oracle
                .ok_or_else(|| anyhow!("StrategyDeps 缺少 yield_oracle"))?,
            chain_reader: self
                .chain_reader
                .ok_or_else(|| anyhow!("StrategyDeps 缺少 chain_reader"))?,
            custody: self
                .custody
                .ok_or_else(|| anyhow!("StrategyDeps 缺少 custody"))?,
            notifier: self.notifier,
        })
    }
}
