use std::sync::Arc;
use std::time::Duration;

use crate::core::config::ExecutionConfig;
use crate::core::error::RebalanceError;
use crate::core::types::{Result, TransactionHash};
use crate::strategies::yield_rebalance::domain::model::{
    ExecutionReceipt, ExecutionStep, RebalancePlan,
};
use crate::strategies::yield_rebalance::domain::network::NetworkConfig;
use crate::strategies::yield_rebalance::infrastructure::abi::{AbiSet, ContractKind};
use crate::strategies::yield_rebalance::infrastructure::custody::{
    ContractCall, CustodyClient, WalletHandle,
};

/// 按顺序执行调仓计划：unstake → approve → swap → approve → stake
#[derive(Clone)]
pub struct ExecutionOrchestrator {
    custody: Arc<dyn CustodyClient>,
    abis: AbiSet,
    network: Arc<NetworkConfig>,
    settings: ExecutionConfig,
    confirmation_timeout: Duration,
}

impl ExecutionOrchestrator {
    pub fn new(
        custody: Arc<dyn CustodyClient>,
        abis: AbiSet,
        network: Arc<NetworkConfig>,
        settings: ExecutionConfig,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            custody,
            abis,
            network,
            settings,
            confirmation_timeout,
        }
    }

    pub fn custody(&self) -> &Arc<dyn CustodyClient> {
        &self.custody
    }

    pub fn network(&self) -> &Arc<NetworkConfig> {
        &self.network
    }

    pub fn abis(&self) -> &AbiSet {
        &self.abis
    }

    pub fn settings(&self) -> &ExecutionConfig {
        &self.settings
    }

    /// 生成计划对应的合约调用序列
    pub fn build_steps(&self, plan: &RebalancePlan) -> Vec<(ExecutionStep, ContractCall)> {
        let allowance = plan.raw_amount.saturating_add(self.settings.approve_buffer);
        let token_abi = self.abis.get(ContractKind::Token);
        let stake_abi = self.abis.get(ContractKind::Stake);
        let router = self.network.swap_router.clone();

        let mut steps = Vec::with_capacity(5);
        steps.push((
            ExecutionStep::Unstake,
            ContractCall::new(
                plan.from_protocol.clone(),
                stake_abi.clone(),
                ExecutionStep::Unstake.method(),
            ),
        ));

        let skip_swap = self.settings.skip_same_token_swap && !plan.requires_swap();
        if !skip_swap {
            steps.push((
                ExecutionStep::ApproveSwap,
                ContractCall::new(
                    plan.token_in.clone(),
                    token_abi.clone(),
                    ExecutionStep::ApproveSwap.method(),
                )
                .arg("spender", &router)
                .arg("amount", allowance),
            ));
            steps.push((
                ExecutionStep::Swap,
                ContractCall::new(
                    router.clone(),
                    self.abis.get(ContractKind::Router),
                    ExecutionStep::Swap.method(),
                )
                .arg("tokenIn", &plan.token_in)
                .arg("tokenOut", &plan.token_out)
                .arg("amountIn", plan.raw_amount),
            ));
        }

        steps.push((
            ExecutionStep::ApproveStake,
            ContractCall::new(
                plan.token_out.clone(),
                token_abi,
                ExecutionStep::ApproveStake.method(),
            )
            .arg("spender", &plan.to_protocol)
            .arg("amount", allowance),
        ));
        steps.push((
            ExecutionStep::Stake,
            ContractCall::new(
                plan.to_protocol.clone(),
                stake_abi,
                ExecutionStep::Stake.method(),
            )
            .arg("_days", 0)
            .arg("_amount", plan.raw_amount),
        ));

        steps
    }

    /// 提交一次调用并在超时内等待确认
    pub async fn submit_and_confirm(
        &self,
        wallet: &WalletHandle,
        call: &ContractCall,
    ) -> Result<TransactionHash> {
        let invocation = self.custody.invoke_contract(wallet, call).await?;

        match tokio::time::timeout(
            self.confirmation_timeout,
            self.custody.await_confirmation(&invocation),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RebalanceError::ConfirmationTimeout {
                method: call.method.clone(),
                contract: call.contract.clone(),
                timeout_secs: self.confirmation_timeout.as_secs(),
            }),
        }
    }

    /// 执行计划；任一步失败即停止，已确认的步骤不回滚
    pub async fn execute(
        &self,
        wallet: &WalletHandle,
        plan: &RebalancePlan,
    ) -> Result<ExecutionReceipt> {
        log::info!(
            "[rebalance] {} 开始迁移 {:.6} {}: {} -> {}",
            plan.owner,
            plan.amount,
            self.network.describe_token(&plan.token_in),
            self.network.describe_protocol(&plan.from_protocol),
            self.network.describe_protocol(&plan.to_protocol)
        );

        let mut completed: Vec<(ExecutionStep, TransactionHash)> = Vec::new();
        for (step, call) in self.build_steps(plan) {
            match self.submit_and_confirm(wallet, &call).await {
                Ok(hash) => {
                    log::info!(
                        "[rebalance] {} 步骤 {} 已确认: {}",
                        plan.owner,
                        step,
                        hash
                    );
                    completed.push((step, hash));
                }
                Err(cause) => {
                    let last_completed = completed.last().map(|(s, _)| *s);
                    return Err(RebalanceError::StepExecutionError {
                        step,
                        last_completed,
                        cause: Box::new(cause),
                    });
                }
            }
        }

        Ok(ExecutionReceipt {
            plan: plan.clone(),
            steps: completed,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::types::Address;
    use crate::strategies::yield_rebalance::domain::network::NetworkDeployment;
    use crate::strategies::yield_rebalance::infrastructure::custody::Invocation;
    use crate::strategies::yield_rebalance::infrastructure::wallet_store::WalletRecord;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    pub(crate) fn addr(tail: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", tail)).unwrap()
    }

    pub(crate) fn test_network() -> Arc<NetworkConfig> {
        let deployment = NetworkDeployment {
            swap_router: format!("0x{:0>40}", "77"),
            tokens: BTreeMap::new(),
            protocols: BTreeMap::new(),
        };
        Arc::new(NetworkConfig::from_deployment("test", &deployment).unwrap())
    }

    /// 记录所有调用的托管服务替身，可按 (钱包, 方法) 注入失败
    #[derive(Default)]
    pub(crate) struct FakeCustody {
        pub calls: Mutex<Vec<(String, ContractCall)>>,
        pub fail_on: Vec<(String, String)>,
        pub hang_on: Vec<(String, String)>,
        pub missing_wallets: Vec<Address>,
    }

    impl FakeCustody {
        pub(crate) fn methods_for(&self, wallet_id: &str) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(w, _)| w == wallet_id)
                .map(|(_, c)| c.method.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CustodyClient for FakeCustody {
        async fn import_wallet(&self, record: &WalletRecord) -> Result<WalletHandle> {
            if self.missing_wallets.contains(&record.user_address) {
                return Err(RebalanceError::ApiError {
                    code: 404,
                    message: "wallet not found".to_string(),
                });
            }
            Ok(WalletHandle {
                wallet_id: format!("w-{}", record.user_address),
                default_address: record.user_address.clone(),
            })
        }

        async fn invoke_contract(
            &self,
            wallet: &WalletHandle,
            call: &ContractCall,
        ) -> Result<Invocation> {
            let key = (wallet.wallet_id.clone(), call.method.clone());
            if self.fail_on.contains(&key) {
                return Err(RebalanceError::Custody {
                    method: call.method.clone(),
                    contract: call.contract.clone(),
                    reason: "execution reverted".to_string(),
                });
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push((wallet.wallet_id.clone(), call.clone()));
            Ok(Invocation {
                invocation_id: format!("inv-{}", calls.len()),
                wallet_id: wallet.wallet_id.clone(),
                method: call.method.clone(),
                contract: call.contract.clone(),
            })
        }

        async fn await_confirmation(&self, invocation: &Invocation) -> Result<TransactionHash> {
            let key = (invocation.wallet_id.clone(), invocation.method.clone());
            if self.hang_on.contains(&key) {
                futures_util::future::pending::<()>().await;
            }
            Ok(format!("0x{}", invocation.invocation_id))
        }
    }

    fn orchestrator(custody: Arc<FakeCustody>, settings: ExecutionConfig) -> ExecutionOrchestrator {
        ExecutionOrchestrator::new(
            custody,
            AbiSet::empty(),
            test_network(),
            settings,
            Duration::from_millis(200),
        )
    }

    fn wallet() -> WalletHandle {
        WalletHandle {
            wallet_id: "w-1".to_string(),
            default_address: addr("1"),
        }
    }

    fn cross_token_plan() -> RebalancePlan {
        RebalancePlan {
            owner: addr("1"),
            from_protocol: addr("a1"),
            token_in: addr("c1"),
            to_protocol: addr("a3"),
            token_out: addr("c2"),
            amount: 100.0,
            raw_amount: 100_000_000,
        }
    }

    #[test]
    fn builds_five_steps_with_buffered_allowance() {
        let orch = orchestrator(Arc::new(FakeCustody::default()), ExecutionConfig::default());
        let steps = orch.build_steps(&cross_token_plan());
        let order: Vec<_> = steps.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            order,
            vec![
                ExecutionStep::Unstake,
                ExecutionStep::ApproveSwap,
                ExecutionStep::Swap,
                ExecutionStep::ApproveStake,
                ExecutionStep::Stake,
            ]
        );

        let (_, approve_swap) = &steps[1];
        assert_eq!(approve_swap.contract, addr("c1"));
        assert_eq!(approve_swap.args["spender"], addr("77").to_string());
        assert_eq!(approve_swap.args["amount"], "100000010");

        let (_, swap) = &steps[2];
        assert_eq!(swap.contract, addr("77"));
        assert_eq!(swap.args["amountIn"], "100000000");
        assert_eq!(swap.args["tokenOut"], addr("c2").to_string());

        let (_, approve_stake) = &steps[3];
        assert_eq!(approve_stake.contract, addr("c2"));
        assert_eq!(approve_stake.args["spender"], addr("a3").to_string());

        let (_, stake) = &steps[4];
        assert_eq!(stake.contract, addr("a3"));
        assert_eq!(stake.args["_days"], "0");
    }

    #[test]
    fn same_token_move_skips_swap_when_enabled() {
        let mut plan = cross_token_plan();
        plan.token_out = plan.token_in.clone();

        let orch = orchestrator(Arc::new(FakeCustody::default()), ExecutionConfig::default());
        let order: Vec<_> = orch.build_steps(&plan).iter().map(|(s, _)| *s).collect();
        assert_eq!(
            order,
            vec![
                ExecutionStep::Unstake,
                ExecutionStep::ApproveStake,
                ExecutionStep::Stake
            ]
        );

        let always_swap = ExecutionConfig {
            skip_same_token_swap: false,
            ..ExecutionConfig::default()
        };
        let orch = orchestrator(Arc::new(FakeCustody::default()), always_swap);
        assert_eq!(orch.build_steps(&plan).len(), 5);
    }

    #[tokio::test]
    async fn executes_all_steps_in_order() {
        let custody = Arc::new(FakeCustody::default());
        let orch = orchestrator(custody.clone(), ExecutionConfig::default());

        let receipt = orch.execute(&wallet(), &cross_token_plan()).await.unwrap();
        assert_eq!(receipt.steps.len(), 5);
        assert_eq!(receipt.transaction_id().map(String::as_str), Some("0xinv-5"));
        assert_eq!(
            custody.methods_for("w-1"),
            vec!["withdrawAll", "approve", "swap", "approve", "stake"]
        );
    }

    #[tokio::test]
    async fn failure_aborts_remaining_steps_and_reports_last_completed() {
        let custody = Arc::new(FakeCustody {
            fail_on: vec![("w-1".to_string(), "swap".to_string())],
            ..Default::default()
        });
        let orch = orchestrator(custody.clone(), ExecutionConfig::default());

        let err = orch.execute(&wallet(), &cross_token_plan()).await.unwrap_err();
        match err {
            RebalanceError::StepExecutionError {
                step,
                last_completed,
                ..
            } => {
                assert_eq!(step, ExecutionStep::Swap);
                assert_eq!(last_completed, Some(ExecutionStep::ApproveSwap));
            }
            other => panic!("unexpected error: {other}"),
        }
        // swap 之后的步骤不会提交
        assert_eq!(custody.methods_for("w-1"), vec!["withdrawAll", "approve"]);
    }

    #[tokio::test]
    async fn pending_confirmation_times_out() {
        let custody = Arc::new(FakeCustody {
            hang_on: vec![("w-1".to_string(), "withdrawAll".to_string())],
            ..Default::default()
        });
        let orch = orchestrator(custody, ExecutionConfig::default());

        let err = orch.execute(&wallet(), &cross_token_plan()).await.unwrap_err();
        match err {
            RebalanceError::StepExecutionError {
                step,
                last_completed,
                cause,
            } => {
                assert_eq!(step, ExecutionStep::Unstake);
                assert_eq!(last_completed, None);
                assert!(matches!(
                    *cause,
                    RebalanceError::ConfirmationTimeout { .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
