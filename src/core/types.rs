/// 统一的类型定义模块
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::core::error::RebalanceError;

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, RebalanceError>;

/// 链上交易哈希
pub type TransactionHash = String;

/// 链上地址（0x + 40位十六进制），统一转为小写
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| RebalanceError::InvalidAddress(raw.to_string()))?;

        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RebalanceError::InvalidAddress(raw.to_string()));
        }

        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 去掉0x前缀的十六进制部分
    pub fn hex(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// 用户风险等级
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// 低风险只允许稳定币协议
    pub fn stablecoin_only(&self) -> bool {
        matches!(self, RiskTier::Low)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        };
        f.write_str(label)
    }
}

impl FromStr for RiskTier {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(RebalanceError::ConfigError(format!(
                "不支持的风险等级: {}",
                other
            ))),
        }
    }
}

/// 用户账户
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub address: Address,
    pub risk_tier: RiskTier,
}

/// 执行步骤
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStep {
    Unstake,
    ApproveSwap,
    Swap,
    ApproveStake,
    Stake,
}

impl ExecutionStep {
    /// 合约方法名
    pub fn method(&self) -> &'static str {
        match self {
            ExecutionStep::Unstake => "withdrawAll",
            ExecutionStep::ApproveSwap | ExecutionStep::ApproveStake => "approve",
            ExecutionStep::Swap => "swap",
            ExecutionStep::Stake => "stake",
        }
    }
}

impl fmt::Display for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionStep::Unstake => "unstake",
            ExecutionStep::ApproveSwap => "approve_swap",
            ExecutionStep::Swap => "swap",
            ExecutionStep::ApproveStake => "approve_stake",
            ExecutionStep::Stake => "stake",
        };
        f.write_str(label)
    }
}

/// 将链上整数数量按精度换算为可读数量
pub fn scale_amount(raw: u128, decimals: u32) -> f64 {
    raw as f64 / 10_f64.powi(decimals as i32)
}

/// 将可读数量换算为链上整数数量（向下取整）
pub fn to_base_units(amount: f64, decimals: u32) -> u128 {
    if amount <= 0.0 || !amount.is_finite() {
        return 0;
    }
    (amount * 10_f64.powi(decimals as i32)).floor() as u128
}
