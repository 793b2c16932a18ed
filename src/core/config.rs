use crate::core::error::RebalanceError;
use crate::core::types::Result;
use crate::core::network::{NetworkConfig, NetworkDeployment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

/// 调仓服务的主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub strategy: StrategyInfo,
    pub yield_oracle: YieldOracleConfig,
    pub chain: ChainConfig,
    pub custody: CustodyConfig,
    pub network: NetworksConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub wallet_store: WalletStoreConfig,
    #[serde(default)]
    pub abi: AbiConfig,
    #[serde(default)]
    pub retry: OracleRetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldOracleConfig {
    pub url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// 质押数量的精度（链上整数 / 10^decimals）
    #[serde(default = "default_decimals")]
    pub amount_decimals: u32,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyConfig {
    pub base_url: String,
    /// 环境变量前缀，读取 {prefix}_API_KEY_NAME / {prefix}_API_KEY_PRIVATE_KEY
    #[serde(default = "default_custody_env")]
    pub api_key_env: String,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworksConfig {
    pub active: String,
    pub deployments: BTreeMap<String, NetworkDeployment>,
}

impl NetworksConfig {
    /// 解析当前启用的网络
    pub fn resolve(&self) -> Result<NetworkConfig> {
        let deployment = self.deployments.get(&self.active).ok_or_else(|| {
            RebalanceError::ConfigError(format!("未找到网络部署: {}", self.active))
        })?;
        NetworkConfig::from_deployment(&self.active, deployment)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// approve 额度在数量基础上额外增加的链上单位
    pub approve_buffer: u128,
    /// 同时处理的用户数
    pub max_concurrent_users: usize,
    /// 同币种迁移时跳过 approve + swap
    pub skip_same_token_swap: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            approve_buffer: 10,
            max_concurrent_users: 4,
            skip_same_token_swap: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    /// 对齐到整点触发
    pub align_to_interval: bool,
    /// 启动后立即执行一次
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            align_to_interval: true,
            run_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletStoreConfig {
    pub path: String,
}

impl Default for WalletStoreConfig {
    fn default() -> Self {
        Self {
            path: "data/wallet.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbiConfig {
    pub token: String,
    pub stake: String,
    pub router: String,
}

impl Default for AbiConfig {
    fn default() -> Self {
        Self {
            token: "abi/MockToken.json".to_string(),
            stake: "abi/MockStake.json".to_string(),
            router: "abi/OptiFinance.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleRetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for OracleRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
    pub file_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            dir: "logs".to_string(),
            file_output: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_level")]
    pub min_level: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    30
}

fn default_decimals() -> u32 {
    6
}

fn default_custody_env() -> String {
    "CDP".to_string()
}

fn default_confirmation_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_min_level() -> String {
    "warning".to_string()
}

fn default_rate_limit() -> u64 {
    60
}

impl AppConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| RebalanceError::ConfigError(format!("读取配置文件失败: {}", e)))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.yield_oracle.url.trim().is_empty() {
            return Err(RebalanceError::ConfigError(
                "yield_oracle.url 不能为空".to_string(),
            ));
        }
        if self.chain.rpc_url.trim().is_empty() {
            return Err(RebalanceError::ConfigError("chain.rpc_url 不能为空".to_string()));
        }
        if self.custody.confirmation_timeout_secs == 0 {
            return Err(RebalanceError::ConfigError(
                "custody.confirmation_timeout_secs 必须大于0".to_string(),
            ));
        }
        if self.execution.max_concurrent_users == 0 {
            return Err(RebalanceError::ConfigError(
                "execution.max_concurrent_users 必须大于0".to_string(),
            ));
        }
        if self.schedule.interval_secs == 0 {
            return Err(RebalanceError::ConfigError(
                "schedule.interval_secs 必须大于0".to_string(),
            ));
        }
        // 网络部署在加载时即校验
        self.network.resolve()?;
        Ok(())
    }
}

/// 托管服务密钥
#[derive(Debug, Clone)]
pub struct CustodyKeys {
    pub key_name: String,
    pub private_key: String,
}

impl CustodyKeys {
    /// 从环境变量加载托管服务密钥
    pub fn from_env(prefix: &str) -> Result<Self> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let prefix_upper = prefix.to_uppercase();

        let key_name = std::env::var(format!("{}_API_KEY_NAME", prefix_upper)).map_err(|_| {
            RebalanceError::ConfigError(format!("未找到{}_API_KEY_NAME环境变量", prefix_upper))
        })?;

        let private_key = std::env::var(format!("{}_API_KEY_PRIVATE_KEY", prefix_upper))
            .or_else(|_| std::env::var(format!("{}_API_SECRET", prefix_upper)))
            .map_err(|_| {
                RebalanceError::ConfigError(format!(
                    "未找到{}_API_KEY_PRIVATE_KEY或{}_API_SECRET环境变量",
                    prefix_upper, prefix_upper
                ))
            })?;

        Ok(Self {
            key_name,
            private_key,
        })
    }
}
