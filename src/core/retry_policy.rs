use crate::core::config::OracleRetryConfig;
use crate::core::error::RebalanceError;
use async_trait::async_trait;
/// 重试策略
use std::time::Duration;
use tokio::time::sleep;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 初始延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 是否添加抖动
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl From<&OracleRetryConfig> for RetryConfig {
    fn from(config: &OracleRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            ..Default::default()
        }
    }
}

/// 重试策略trait
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    /// 判断是否应该重试
    fn should_retry(&self, error: &RebalanceError, attempt: u32) -> bool;

    /// 计算重试延迟
    fn calculate_delay(&self, attempt: u32) -> Duration;

    /// 执行带重试的操作
    async fn execute_with_retry<F, T, Fut>(&self, operation: F) -> Result<T, RebalanceError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T, RebalanceError>> + Send,
        T: Send;
}

/// 指数退避重试策略
pub struct ExponentialBackoffRetry {
    config: RetryConfig,
}

impl ExponentialBackoffRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        self.config.initial_delay_ms = delay_ms;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.config.jitter = false;
        self
    }
}

#[async_trait]
impl RetryPolicy for ExponentialBackoffRetry {
    fn should_retry(&self, error: &RebalanceError, attempt: u32) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }

        error.is_retryable()
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(attempt as i32);

        let mut delay_ms = base_delay.min(self.config.max_delay_ms as f64) as u64;

        // 添加抖动以避免雷同重试
        if self.config.jitter && delay_ms > 0 {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0..=delay_ms / 4);
            delay_ms += jitter;
        }

        Duration::from_millis(delay_ms)
    }

    async fn execute_with_retry<F, T, Fut>(&self, operation: F) -> Result<T, RebalanceError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T, RebalanceError>> + Send,
        T: Send,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        log::info!("✅ 操作在第{}次尝试后成功", attempt + 1);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        log::error!("❌ 操作失败且不再重试: {}", error);
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt);
                    log::warn!(
                        "⚠️ 操作失败，将在{:.2}秒后重试 (尝试 {}/{}): {}",
                        delay.as_secs_f64(),
                        attempt + 1,
                        self.config.max_retries,
                        error
                    );

                    attempt += 1;

                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> ExponentialBackoffRetry {
        ExponentialBackoffRetry::new(RetryConfig::default())
            .with_max_retries(max_retries)
            .with_initial_delay(1)
            .without_jitter()
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy(3)
            .execute_with_retry(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(RebalanceError::OracleUnavailable("503".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_on_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = fast_policy(5)
            .execute_with_retry(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RebalanceError::ConfigError("bad".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_is_capped() {
        let policy = ExponentialBackoffRetry::new(RetryConfig {
            max_retries: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 4000,
            backoff_factor: 2.0,
            jitter: false,
        });
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(5), Duration::from_millis(4000));
    }
}
