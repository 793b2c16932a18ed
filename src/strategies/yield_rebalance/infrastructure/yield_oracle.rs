use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::config::YieldOracleConfig;
use crate::core::error::RebalanceError;
use crate::core::types::{Address, Result};
use crate::strategies::yield_rebalance::domain::model::{ProtocolQuote, QuoteSnapshot};

/// 收益率数据源
#[async_trait]
pub trait YieldOracle: Send + Sync {
    /// 拉取当前所有协议报价，失败返回 OracleUnavailable，内部不重试
    async fn fetch_quotes(&self) -> Result<QuoteSnapshot>;
}

/// 收益率服务返回的原始条目
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    address_staking: String,
    apy: RawApy,
    address_token: String,
    stablecoin: bool,
}

/// apy 字段可能是字符串也可能是数字
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawApy {
    Number(f64),
    Text(String),
}

impl RawApy {
    fn to_f64(&self) -> Option<f64> {
        match self {
            RawApy::Number(v) => Some(*v),
            RawApy::Text(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        }
    }
}

/// 解析收益率服务的响应体
pub fn parse_quotes(body: &str) -> Result<Vec<ProtocolQuote>> {
    let raw: Vec<RawQuote> = serde_json::from_str(body)
        .map_err(|e| RebalanceError::OracleUnavailable(format!("响应格式错误: {}", e)))?;

    raw.into_iter()
        .map(|item| {
            let apy = item
                .apy
                .to_f64()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| {
                    RebalanceError::OracleUnavailable(format!(
                        "协议 {} 的apy无效: {:?}",
                        item.address_staking, item.apy
                    ))
                })?;

            let protocol_address = Address::parse(&item.address_staking)
                .map_err(|e| RebalanceError::OracleUnavailable(e.to_string()))?;
            let token_address = Address::parse(&item.address_token)
                .map_err(|e| RebalanceError::OracleUnavailable(e.to_string()))?;

            Ok(ProtocolQuote {
                protocol_address,
                token_address,
                apy,
                is_stablecoin: item.stablecoin,
            })
        })
        .collect()
}

/// 基于HTTP的收益率客户端
pub struct HttpYieldOracle {
    client: Client,
    url: String,
}

impl HttpYieldOracle {
    pub fn new(config: &YieldOracleConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("YieldRebalancer/0.1.0")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl YieldOracle for HttpYieldOracle {
    async fn fetch_quotes(&self) -> Result<QuoteSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RebalanceError::OracleUnavailable(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RebalanceError::OracleUnavailable(format!(
                "HTTP状态码 {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RebalanceError::OracleUnavailable(format!("读取响应失败: {}", e)))?;

        let quotes = parse_quotes(&body)?;
        log::debug!("[rebalance] 获取到 {} 条协议报价", quotes.len());
        Ok(QuoteSnapshot::new(quotes))
    }
}
