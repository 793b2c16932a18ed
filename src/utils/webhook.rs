//! Webhook通知模块
//! 用于推送调仓告警（企业微信 markdown 格式）

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::config::NotificationConfig;
use crate::core::error::RebalanceError;
use crate::core::types::Result;

/// 消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl MessageLevel {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            "critical" => Self::Critical,
            _ => Self::Info,
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Self::Debug => "🔍",
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }
}

#[derive(Debug, Serialize)]
struct MarkdownMessage {
    msgtype: String,
    markdown: MarkdownContent,
}

#[derive(Debug, Serialize)]
struct MarkdownContent {
    content: String,
}

/// Webhook通知器
pub struct WebhookNotifier {
    config: NotificationConfig,
    client: Client,
    /// 上次发送时间（按 策略::标题 限流）
    last_send_times: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl WebhookNotifier {
    pub fn new(config: NotificationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            config,
            client,
            last_send_times: RwLock::new(HashMap::new()),
        })
    }

    /// 发送事件通知；未启用、级别不足或限流中时直接返回
    pub async fn send_event(
        &self,
        strategy: &str,
        title: &str,
        body: &str,
        level: MessageLevel,
    ) -> Result<()> {
        if !self.should_send(level) {
            return Ok(());
        }

        let key = format!("{}::{}", strategy, title);
        if !self.check_rate_limit(&key).await {
            debug!("跳过推送，限流中: {}", key);
            return Ok(());
        }

        let content = build_event_message(strategy, title, body, level);
        self.post_markdown(content).await
    }

    fn should_send(&self, level: MessageLevel) -> bool {
        self.config.enabled && level >= MessageLevel::parse(&self.config.min_level)
    }

    async fn check_rate_limit(&self, key: &str) -> bool {
        let mut times = self.last_send_times.write().await;
        let now = Utc::now();

        if let Some(last_time) = times.get(key) {
            let elapsed = now.signed_duration_since(*last_time);
            if elapsed < Duration::seconds(self.config.rate_limit_seconds as i64) {
                return false;
            }
        }

        times.insert(key.to_string(), now);
        true
    }

    async fn post_markdown(&self, content: String) -> Result<()> {
        let message = MarkdownMessage {
            msgtype: "markdown".to_string(),
            markdown: MarkdownContent { content },
        };

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("成功发送Webhook通知");
            Ok(())
        } else {
            warn!("Webhook发送失败: {}", status);
            Err(RebalanceError::ApiError {
                code: status.as_u16(),
                message: "webhook 推送失败".to_string(),
            })
        }
    }
}

fn build_event_message(strategy: &str, title: &str, body: &str, level: MessageLevel) -> String {
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    format!(
        r#"## {} {}

**策略**: {}
**级别**: {:?}
**时间**: {}

{}

---
_自动推送 by yield-rebalancer_"#,
        level.emoji(),
        title,
        strategy,
        level,
        now,
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(enabled: bool, min_level: &str) -> WebhookNotifier {
        WebhookNotifier::new(NotificationConfig {
            webhook_url: "http://127.0.0.1:9/hook".to_string(),
            enabled,
            min_level: min_level.to_string(),
            rate_limit_seconds: 60,
        })
        .unwrap()
    }

    #[test]
    fn filters_by_level_and_switch() {
        let n = notifier(true, "error");
        assert!(!n.should_send(MessageLevel::Warning));
        assert!(n.should_send(MessageLevel::Critical));
        assert!(!notifier(false, "debug").should_send(MessageLevel::Critical));
    }

    #[tokio::test]
    async fn rate_limit_is_per_key() {
        let n = notifier(true, "info");
        assert!(n.check_rate_limit("a::x").await);
        assert!(!n.check_rate_limit("a::x").await);
        assert!(n.check_rate_limit("a::y").await);
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let n = notifier(false, "info");
        n.send_event("s", "t", "b", MessageLevel::Critical)
            .await
            .unwrap();
    }

    #[test]
    fn message_carries_title_and_body() {
        let msg = build_event_message("yield_rebalance", "调仓失败", "**用户**: 0xabc", MessageLevel::Error);
        assert!(msg.starts_with("## ❌ 调仓失败"));
        assert!(msg.contains("**策略**: yield_rebalance"));
        assert!(msg.contains("**用户**: 0xabc"));
    }
}
