use std::sync::Arc;

use serde_json::Value;

use crate::core::config::AbiConfig;
use crate::core::error::RebalanceError;
use crate::core::types::Result;

/// 合约种类
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContractKind {
    /// ERC20 代币（approve / mint / transfer）
    Token,
    /// 质押合约（stake / withdrawAll / getAmountStakeByUser）
    Stake,
    /// 兑换路由（swap）
    Router,
}

/// 三类合约的ABI
#[derive(Debug, Clone)]
pub struct AbiSet {
    token: Arc<Value>,
    stake: Arc<Value>,
    router: Arc<Value>,
}

impl AbiSet {
    pub fn load(config: &AbiConfig) -> Result<Self> {
        Ok(Self {
            token: Arc::new(read_abi(&config.token)?),
            stake: Arc::new(read_abi(&config.stake)?),
            router: Arc::new(read_abi(&config.router)?),
        })
    }

    /// 不带ABI定义，由托管服务按方法名解析
    pub fn empty() -> Self {
        Self {
            token: Arc::new(Value::Array(Vec::new())),
            stake: Arc::new(Value::Array(Vec::new())),
            router: Arc::new(Value::Array(Vec::new())),
        }
    }

    pub fn get(&self, kind: ContractKind) -> Arc<Value> {
        match kind {
            ContractKind::Token => self.token.clone(),
            ContractKind::Stake => self.stake.clone(),
            ContractKind::Router => self.router.clone(),
        }
    }
}

fn read_abi(path: &str) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| RebalanceError::ConfigError(format!("读取ABI文件 {} 失败: {}", path, e)))?;
    let abi: Value = serde_json::from_str(&contents)?;
    if !abi.is_array() {
        return Err(RebalanceError::ConfigError(format!(
            "ABI文件 {} 必须是JSON数组",
            path
        )));
    }
    Ok(abi)
}
