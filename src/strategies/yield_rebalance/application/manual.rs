use std::sync::Arc;

use crate::core::types::{to_base_units, Address, Result, TransactionHash};
use crate::strategies::yield_rebalance::domain::network::{Asset, Protocol};
use crate::strategies::yield_rebalance::infrastructure::abi::ContractKind;
use crate::strategies::yield_rebalance::infrastructure::custody::{ContractCall, WalletHandle};
use crate::strategies::yield_rebalance::infrastructure::wallet_store::WalletStore;

use super::orchestrator::ExecutionOrchestrator;

/// 手动操作：按资产/协议名称直接调用合约
pub struct ManualOperations {
    orchestrator: ExecutionOrchestrator,
    store: Arc<dyn WalletStore>,
    decimals: u32,
}

impl ManualOperations {
    pub fn new(
        orchestrator: ExecutionOrchestrator,
        store: Arc<dyn WalletStore>,
        decimals: u32,
    ) -> Self {
        Self {
            orchestrator,
            store,
            decimals,
        }
    }

    async fn wallet(&self, user: &Address) -> Result<WalletHandle> {
        let record = self.store.wallet_record(user).await?;
        self.orchestrator.custody().import_wallet(&record).await
    }

    async fn run_calls(&self, user: &Address, calls: Vec<ContractCall>) -> Result<TransactionHash> {
        let wallet = self.wallet(user).await?;
        let mut last = TransactionHash::new();
        for call in calls {
            last = self.orchestrator.submit_and_confirm(&wallet, &call).await?;
            log::info!(
                "[manual] {} {} @ {} 已确认: {}",
                user,
                call.method,
                call.contract,
                last
            );
        }
        Ok(last)
    }

    fn base_units(&self, amount: f64) -> u128 {
        to_base_units(amount, self.decimals)
    }

    fn allowance(&self, raw: u128) -> u128 {
        raw.saturating_add(self.orchestrator.settings().approve_buffer)
    }

    /// approve + stake
    pub fn stake_calls(&self, asset: Asset, protocol: Protocol, amount: f64) -> Result<Vec<ContractCall>> {
        let network = self.orchestrator.network();
        let abis = self.orchestrator.abis();
        let token = network.token_address(asset)?.clone();
        let target = network.protocol_address(protocol)?.clone();
        let raw = self.base_units(amount);

        Ok(vec![
            ContractCall::new(token, abis.get(ContractKind::Token), "approve")
                .arg("spender", &target)
                .arg("amount", self.allowance(raw)),
            ContractCall::new(target, abis.get(ContractKind::Stake), "stake")
                .arg("_days", 0)
                .arg("_amount", raw),
        ])
    }

    /// approve + swap
    pub fn swap_calls(&self, token_in: Asset, token_out: Asset, amount: f64) -> Result<Vec<ContractCall>> {
        let network = self.orchestrator.network();
        let abis = self.orchestrator.abis();
        let input = network.token_address(token_in)?.clone();
        let output = network.token_address(token_out)?.clone();
        let router = network.swap_router.clone();
        let raw = self.base_units(amount);

        Ok(vec![
            ContractCall::new(input.clone(), abis.get(ContractKind::Token), "approve")
                .arg("spender", &router)
                .arg("amount", self.allowance(raw)),
            ContractCall::new(router, abis.get(ContractKind::Router), "swap")
                .arg("tokenIn", &input)
                .arg("tokenOut", &output)
                .arg("amountIn", raw),
        ])
    }

    pub async fn stake(
        &self,
        user: &Address,
        asset: Asset,
        protocol: Protocol,
        amount: f64,
    ) -> Result<TransactionHash> {
        let calls = self.stake_calls(asset, protocol, amount)?;
        self.run_calls(user, calls).await
    }

    pub async fn unstake(&self, user: &Address, protocol: Protocol) -> Result<TransactionHash> {
        let target = self.orchestrator.network().protocol_address(protocol)?.clone();
        let call = ContractCall::new(
            target,
            self.orchestrator.abis().get(ContractKind::Stake),
            "withdrawAll",
        );
        self.run_calls(user, vec![call]).await
    }

    pub async fn swap(
        &self,
        user: &Address,
        token_in: Asset,
        token_out: Asset,
        amount: f64,
    ) -> Result<TransactionHash> {
        let calls = self.swap_calls(token_in, token_out, amount)?;
        self.run_calls(user, calls).await
    }

    /// 测试代币铸造到用户托管钱包
    pub async fn mint(&self, user: &Address, asset: Asset, amount: f64) -> Result<TransactionHash> {
        let token = self.orchestrator.network().token_address(asset)?.clone();
        let wallet = self.wallet(user).await?;
        let call = ContractCall::new(token, self.orchestrator.abis().get(ContractKind::Token), "mint")
            .arg("to", &wallet.default_address)
            .arg("amount", self.base_units(amount));

        let hash = self.orchestrator.submit_and_confirm(&wallet, &call).await?;
        log::info!("[manual] {} mint {} {} 已确认: {}", user, amount, asset, hash);
        Ok(hash)
    }

    pub async fn transfer(
        &self,
        user: &Address,
        asset: Asset,
        to: &Address,
        amount: f64,
    ) -> Result<TransactionHash> {
        let token = self.orchestrator.network().token_address(asset)?.clone();
        let call = ContractCall::new(token, self.orchestrator.abis().get(ContractKind::Token), "transfer")
            .arg("to", to)
            .arg("value", self.base_units(amount));
        self.run_calls(user, vec![call]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ExecutionConfig;
    use crate::core::error::RebalanceError;
    use crate::strategies::yield_rebalance::application::orchestrator::tests::{addr, FakeCustody};
    use crate::strategies::yield_rebalance::domain::network::{NetworkConfig, NetworkDeployment};
    use crate::strategies::yield_rebalance::infrastructure::abi::AbiSet;
    use crate::strategies::yield_rebalance::infrastructure::wallet_store::WalletRecord;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct OneUserStore;

    #[async_trait]
    impl WalletStore for OneUserStore {
        async fn user_addresses(&self) -> Result<Vec<Address>> {
            Ok(vec![addr("1")])
        }

        async fn wallet_record(&self, user: &Address) -> Result<WalletRecord> {
            if user == &addr("1") {
                Ok(WalletRecord {
                    user_address: user.clone(),
                    data: serde_json::json!({}),
                    risk_profile: Some("low".to_string()),
                })
            } else {
                Err(RebalanceError::NoWalletFound(user.clone()))
            }
        }
    }

    fn manual(custody: Arc<FakeCustody>) -> ManualOperations {
        let mut tokens = BTreeMap::new();
        tokens.insert("usdc".to_string(), format!("0x{:0>40}", "c1"));
        tokens.insert("weth".to_string(), format!("0x{:0>40}", "c2"));
        let mut protocols = BTreeMap::new();
        protocols.insert("aavev3".to_string(), format!("0x{:0>40}", "a1"));
        let deployment = NetworkDeployment {
            swap_router: format!("0x{:0>40}", "77"),
            tokens,
            protocols,
        };
        let network = Arc::new(NetworkConfig::from_deployment("test", &deployment).unwrap());

        let orchestrator = ExecutionOrchestrator::new(
            custody,
            AbiSet::empty(),
            network,
            ExecutionConfig::default(),
            Duration::from_secs(1),
        );
        ManualOperations::new(orchestrator, Arc::new(OneUserStore), 6)
    }

    #[test]
    fn stake_scales_amount_and_buffers_allowance() {
        let ops = manual(Arc::new(FakeCustody::default()));
        let calls = ops.stake_calls(Asset::Usdc, Protocol::AaveV3, 12.5).unwrap();
        assert_eq!(calls[0].method, "approve");
        assert_eq!(calls[0].args["amount"], "12500010");
        assert_eq!(calls[0].args["spender"], addr("a1").to_string());
        assert_eq!(calls[1].contract, addr("a1"));
        assert_eq!(calls[1].args["_amount"], "12500000");
    }

    #[test]
    fn unconfigured_names_are_rejected() {
        let ops = manual(Arc::new(FakeCustody::default()));
        assert!(matches!(
            ops.stake_calls(Asset::Dai, Protocol::AaveV3, 1.0),
            Err(RebalanceError::UnknownAsset(_))
        ));
        assert!(matches!(
            ops.stake_calls(Asset::Usdc, Protocol::Uniswap, 1.0),
            Err(RebalanceError::UnknownProtocol(_))
        ));
    }

    #[tokio::test]
    async fn swap_runs_approve_then_swap() {
        let custody = Arc::new(FakeCustody::default());
        let ops = manual(custody.clone());
        let hash = ops.swap(&addr("1"), Asset::Usdc, Asset::Weth, 1.0).await.unwrap();

        assert_eq!(hash, "0xinv-2");
        let wallet_id = format!("w-{}", addr("1"));
        assert_eq!(custody.methods_for(&wallet_id), vec!["approve", "swap"]);
    }

    #[tokio::test]
    async fn mint_targets_wallet_default_address() {
        let custody = Arc::new(FakeCustody::default());
        let ops = manual(custody.clone());
        ops.mint(&addr("1"), Asset::Usdc, 100.0).await.unwrap();

        let calls = custody.calls.lock().unwrap();
        assert_eq!(calls[0].1.args["to"], addr("1").to_string());
        assert_eq!(calls[0].1.args["amount"], "100000000");
    }

    #[tokio::test]
    async fn unknown_user_has_no_wallet() {
        let ops = manual(Arc::new(FakeCustody::default()));
        let err = ops.unstake(&addr("9"), Protocol::AaveV3).await.unwrap_err();
        assert!(matches!(err, RebalanceError::NoWalletFound(_)));
    }
}
