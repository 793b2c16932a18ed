use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::RebalanceError;
use crate::core::types::{Address, Result, RiskTier};

/// 钱包记录：用户地址、托管钱包数据、风险等级
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub user_address: Address,
    pub data: Value,
    #[serde(default)]
    pub risk_profile: Option<String>,
}

impl WalletRecord {
    pub fn risk_tier(&self) -> Result<RiskTier> {
        match &self.risk_profile {
            Some(raw) => raw.parse(),
            None => Err(RebalanceError::MissingRiskProfile(self.user_address.clone())),
        }
    }
}

/// 钱包与风险等级存储（只读）
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// 所有已登记用户，按存储顺序
    async fn user_addresses(&self) -> Result<Vec<Address>>;

    /// 查找用户的钱包记录，不存在返回 NoWalletFound
    async fn wallet_record(&self, user: &Address) -> Result<WalletRecord>;
}

/// 基于JSON文件的钱包存储，每次读取都重新加载文件
pub struct JsonWalletStore {
    path: String,
}

impl JsonWalletStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<WalletRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("[rebalance] 钱包文件 {} 不存在，视为空", self.path);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let records: Vec<WalletRecord> = serde_json::from_slice(&bytes)?;
        Ok(records)
    }
}

#[async_trait]
impl WalletStore for JsonWalletStore {
    async fn user_addresses(&self) -> Result<Vec<Address>> {
        let records = self.load().await?;
        let mut addresses: Vec<Address> = Vec::with_capacity(records.len());
        for record in records {
            if !addresses.contains(&record.user_address) {
                addresses.push(record.user_address);
            }
        }
        Ok(addresses)
    }

    async fn wallet_record(&self, user: &Address) -> Result<WalletRecord> {
        self.load()
            .await?
            .into_iter()
            .find(|record| &record.user_address == user)
            .ok_or_else(|| RebalanceError::NoWalletFound(user.clone()))
    }
}
