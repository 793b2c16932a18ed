// 核心模块 - 配置、错误、网络、重试与基础类型
pub mod config;
pub mod error;
pub mod network;
pub mod retry_policy;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::{Address, RiskTier, TransactionHash, UserAccount};
