use std::str::FromStr;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{Address as EvmAddress, TxKind};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::eth::{TransactionInput, TransactionRequest};
use alloy::sol;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use url::Url;

use crate::core::config::ChainConfig;
use crate::core::error::RebalanceError;
use crate::core::types::{Address, Result};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IStakePool {
        function getAmountStakeByUser(address user) external view returns (uint256);
    }
}

/// 链上只读访问
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// 查询用户在质押合约中的原始数量
    async fn staked_amount(&self, protocol: &Address, user: &Address) -> Result<u128>;
}

fn evm_address(address: &Address) -> std::result::Result<EvmAddress, String> {
    EvmAddress::from_str(address.as_str()).map_err(|e| format!("地址转换失败 {}: {}", address, e))
}

/// `getAmountStakeByUser(user)` 的调用数据
pub fn staked_amount_calldata(user: &Address) -> std::result::Result<Vec<u8>, String> {
    Ok(IStakePool::getAmountStakeByUserCall {
        user: evm_address(user)?,
    }
    .abi_encode())
}

/// 解码 uint256 返回值，超出 u128 视为错误
pub fn decode_staked_amount(data: &[u8]) -> std::result::Result<u128, String> {
    let value = IStakePool::getAmountStakeByUserCall::abi_decode_returns(data)
        .map_err(|e| format!("返回值解析失败: {}", e))?;
    u128::try_from(value).map_err(|_| format!("返回值超出u128范围: {}", value))
}

/// 基于 `eth_call` 的链上读取
pub struct JsonRpcChainReader {
    provider: RootProvider<Ethereum>,
    timeout: Duration,
}

impl JsonRpcChainReader {
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let url = Url::parse(&config.rpc_url)
            .map_err(|e| RebalanceError::ConfigError(format!("RPC地址无效: {}", e)))?;

        Ok(Self {
            provider: RootProvider::new_http(url),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn read(&self, protocol: &Address, user: &Address) -> std::result::Result<u128, String> {
        let request = TransactionRequest {
            to: Some(TxKind::Call(evm_address(protocol)?)),
            input: TransactionInput::new(staked_amount_calldata(user)?.into()),
            ..Default::default()
        };

        let bytes = tokio::time::timeout(self.timeout, self.provider.call(request))
            .await
            .map_err(|_| format!("eth_call超时 ({}秒)", self.timeout.as_secs()))?
            .map_err(|e| format!("eth_call失败: {}", e))?;

        decode_staked_amount(&bytes)
    }
}

#[async_trait]
impl ChainReader for JsonRpcChainReader {
    async fn staked_amount(&self, protocol: &Address, user: &Address) -> Result<u128> {
        self.read(protocol, user)
            .await
            .map_err(|reason| RebalanceError::ChainReadError {
                protocol: protocol.clone(),
                reason,
            })
    }
}
