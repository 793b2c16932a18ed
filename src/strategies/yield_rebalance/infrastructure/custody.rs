use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::config::{CustodyConfig, CustodyKeys};
use crate::core::error::RebalanceError;
use crate::core::types::{Address, Result, TransactionHash};
use crate::utils::signature::SignatureHelper;

use super::wallet_store::WalletRecord;

/// 已导入的托管钱包
#[derive(Debug, Clone, PartialEq)]
pub struct WalletHandle {
    pub wallet_id: String,
    /// 钱包默认地址（实际持有资产的链上地址）
    pub default_address: Address,
}

/// 一次合约调用
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub contract: Address,
    pub abi: Arc<Value>,
    pub method: String,
    pub args: BTreeMap<String, String>,
}

impl ContractCall {
    pub fn new(contract: Address, abi: Arc<Value>, method: impl Into<String>) -> Self {
        Self {
            contract,
            abi,
            method: method.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, name: &str, value: impl ToString) -> Self {
        self.args.insert(name.to_string(), value.to_string());
        self
    }
}

/// 已提交、等待确认的调用
#[derive(Debug, Clone)]
pub struct Invocation {
    pub invocation_id: String,
    pub wallet_id: String,
    pub method: String,
    pub contract: Address,
}

/// 托管服务：导入钱包、调用合约、等待链上确认
#[async_trait]
pub trait CustodyClient: Send + Sync {
    async fn import_wallet(&self, record: &WalletRecord) -> Result<WalletHandle>;

    async fn invoke_contract(&self, wallet: &WalletHandle, call: &ContractCall)
        -> Result<Invocation>;

    /// 等待调用上链确认，不自带超时
    async fn await_confirmation(&self, invocation: &Invocation) -> Result<TransactionHash>;
}

#[derive(Debug, Deserialize)]
struct ImportResponse {
    wallet_id: String,
    default_address: String,
}

#[derive(Debug, Deserialize)]
struct InvocationResponse {
    invocation_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvocationStatus {
    status: String,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 调用状态
#[derive(Debug, Clone, PartialEq)]
enum InvocationState {
    Pending,
    Complete(TransactionHash),
    Failed(String),
}

fn classify_status(status: &InvocationStatus) -> InvocationState {
    match status.status.to_lowercase().as_str() {
        "complete" | "completed" | "confirmed" => match &status.transaction_hash {
            Some(hash) => InvocationState::Complete(hash.clone()),
            None => InvocationState::Failed("确认结果缺少交易哈希".to_string()),
        },
        "failed" | "reverted" | "rejected" => InvocationState::Failed(
            status
                .error
                .clone()
                .unwrap_or_else(|| format!("状态 {}", status.status)),
        ),
        _ => InvocationState::Pending,
    }
}

/// 基于REST接口的托管服务客户端
pub struct HttpCustodyClient {
    client: Client,
    base_url: String,
    keys: CustodyKeys,
    poll_interval: Duration,
}

impl HttpCustodyClient {
    pub fn new(config: &CustodyConfig, keys: CustodyKeys) -> Result<Self> {
        let client = Client::builder()
            .user_agent("YieldRebalancer/0.1.0")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            keys,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(100)),
        })
    }

    async fn signed_request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let body_text = match body {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };
        let timestamp = SignatureHelper::timestamp_ms();
        let signature = SignatureHelper::custody_signature(
            &self.keys.private_key,
            &timestamp,
            method.as_str(),
            path,
            &body_text,
        );

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .header("X-API-KEY", &self.keys.key_name)
            .header("X-TIMESTAMP", &timestamp)
            .header("X-SIGNATURE", signature);
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_text);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "请求错误".to_string());
            return Err(RebalanceError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CustodyClient for HttpCustodyClient {
    async fn import_wallet(&self, record: &WalletRecord) -> Result<WalletHandle> {
        let body = json!({ "data": record.data });
        let value = self
            .signed_request(Method::POST, "/v1/wallets/import", Some(&body))
            .await?;
        let response: ImportResponse = serde_json::from_value(value)?;

        Ok(WalletHandle {
            wallet_id: response.wallet_id,
            default_address: Address::parse(&response.default_address)?,
        })
    }

    async fn invoke_contract(
        &self,
        wallet: &WalletHandle,
        call: &ContractCall,
    ) -> Result<Invocation> {
        let path = format!("/v1/wallets/{}/invocations", wallet.wallet_id);
        let body = json!({
            "contract_address": call.contract.as_str(),
            "abi": call.abi.as_ref(),
            "method": call.method,
            "args": call.args,
        });

        let value = self
            .signed_request(Method::POST, &path, Some(&body))
            .await
            .map_err(|e| RebalanceError::Custody {
                method: call.method.clone(),
                contract: call.contract.clone(),
                reason: e.to_string(),
            })?;
        let response: InvocationResponse =
            serde_json::from_value(value).map_err(|e| RebalanceError::Custody {
                method: call.method.clone(),
                contract: call.contract.clone(),
                reason: format!("响应解析失败: {}", e),
            })?;

        if let Some(status) = &response.status {
            if matches!(status.as_str(), "failed" | "rejected") {
                return Err(RebalanceError::Custody {
                    method: call.method.clone(),
                    contract: call.contract.clone(),
                    reason: format!("提交被拒绝: {}", status),
                });
            }
        }

        Ok(Invocation {
            invocation_id: response.invocation_id,
            wallet_id: wallet.wallet_id.clone(),
            method: call.method.clone(),
            contract: call.contract.clone(),
        })
    }

    async fn await_confirmation(&self, invocation: &Invocation) -> Result<TransactionHash> {
        let path = format!(
            "/v1/wallets/{}/invocations/{}",
            invocation.wallet_id, invocation.invocation_id
        );

        loop {
            let custody_error = |reason: String| RebalanceError::Custody {
                method: invocation.method.clone(),
                contract: invocation.contract.clone(),
                reason,
            };

            let value = match self.signed_request(Method::GET, &path, None).await {
                Ok(value) => value,
                Err(err) if err.is_retryable() => {
                    log::debug!(
                        "[custody] 查询 {} 状态失败，稍后重试: {}",
                        invocation.invocation_id,
                        err
                    );
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                Err(err) => return Err(custody_error(err.to_string())),
            };

            let status: InvocationStatus = serde_json::from_value(value)
                .map_err(|e| custody_error(format!("状态解析失败: {}", e)))?;

            match classify_status(&status) {
                InvocationState::Complete(hash) => return Ok(hash),
                InvocationState::Failed(reason) => return Err(custody_error(reason)),
                InvocationState::Pending => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}
