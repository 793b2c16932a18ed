use thiserror::Error;

use crate::core::types::{Address, ExecutionStep};

#[derive(Error, Debug)]
pub enum RebalanceError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("文件读写错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("收益率服务不可用: {0}")]
    OracleUnavailable(String),

    #[error("链上读取失败: 协议 {protocol} - {reason}")]
    ChainReadError { protocol: Address, reason: String },

    #[error("执行步骤 {step} 失败 (最后完成步骤: {}): {cause}", last_completed_label(.last_completed))]
    StepExecutionError {
        step: ExecutionStep,
        last_completed: Option<ExecutionStep>,
        cause: Box<RebalanceError>,
    },

    #[error("未找到用户钱包: {0}")]
    NoWalletFound(Address),

    #[error("用户缺少风险等级: {0}")]
    MissingRiskProfile(Address),

    #[error("未知资产: {0}")]
    UnknownAsset(String),

    #[error("未知协议: {0}")]
    UnknownProtocol(String),

    #[error("地址格式错误: {0}")]
    InvalidAddress(String),

    #[error("等待确认超时: {method} @ {contract} ({timeout_secs}秒)")]
    ConfirmationTimeout {
        method: String,
        contract: Address,
        timeout_secs: u64,
    },

    #[error("托管服务调用失败: {method} @ {contract} - {reason}")]
    Custody {
        method: String,
        contract: Address,
        reason: String,
    },

    #[error("托管服务API错误: {code} - {message}")]
    ApiError { code: u16, message: String },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

fn last_completed_label(step: &Option<ExecutionStep>) -> String {
    match step {
        Some(step) => step.to_string(),
        None => "无".to_string(),
    }
}

impl RebalanceError {
    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            RebalanceError::NetworkError(_) => true,
            RebalanceError::OracleUnavailable(_) => true,
            RebalanceError::ApiError { code, .. } => {
                // HTTP 5xx 和 429 可以重试
                *code == 429 || (*code >= 500 && *code < 600)
            }
            _ => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RebalanceError::NetworkError(_) => ErrorSeverity::Warning,
            RebalanceError::OracleUnavailable(_) => ErrorSeverity::Warning,
            RebalanceError::ChainReadError { .. } => ErrorSeverity::Warning,
            RebalanceError::NoWalletFound(_) => ErrorSeverity::Warning,
            RebalanceError::MissingRiskProfile(_) => ErrorSeverity::Warning,
            // 资金可能停留在未质押状态
            RebalanceError::StepExecutionError {
                last_completed: Some(_),
                ..
            } => ErrorSeverity::Critical,
            RebalanceError::ConfigError(_) => ErrorSeverity::Critical,
            RebalanceError::UnknownAsset(_) => ErrorSeverity::Critical,
            RebalanceError::UnknownProtocol(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// 部分执行：至少一个链上步骤已确认
    pub fn is_partial_execution(&self) -> bool {
        matches!(
            self,
            RebalanceError::StepExecutionError {
                last_completed: Some(_),
                ..
            }
        )
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    Info,     // 信息性错误，通常不影响操作
    Warning,  // 警告性错误，下个周期会自动重新评估
    Error,    // 一般错误，需要人工查看
    Critical, // 严重错误，需要立即处理
}
