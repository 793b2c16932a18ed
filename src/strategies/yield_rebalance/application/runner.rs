use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::error::{ErrorSeverity, RebalanceError};
use crate::core::retry_policy::{ExponentialBackoffRetry, RetryConfig, RetryPolicy};
use crate::core::types::{Address, Result, UserAccount};
use crate::strategies::yield_rebalance::domain::model::{QuoteSnapshot, RebalancePlan};
use crate::strategies::yield_rebalance::domain::planner;
use crate::strategies::yield_rebalance::infrastructure::custody::WalletHandle;
use crate::strategies::yield_rebalance::infrastructure::position_reader::{
    PositionReader, PositionReadout,
};
use crate::strategies::yield_rebalance::infrastructure::wallet_store::WalletStore;
use crate::strategies::yield_rebalance::infrastructure::yield_oracle::YieldOracle;
use crate::utils::webhook::{MessageLevel, WebhookNotifier};

use super::orchestrator::ExecutionOrchestrator;

/// 一个周期的统计
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users_total: usize,
    pub users_skipped: usize,
    pub users_aborted: usize,
    pub positions_read: usize,
    pub read_failures: usize,
    pub plans_attempted: usize,
    pub plans_succeeded: usize,
    pub plans_failed: usize,
    pub oracle_unavailable: bool,
    pub aborted_reason: Option<String>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            users_total: 0,
            users_skipped: 0,
            users_aborted: 0,
            positions_read: 0,
            read_failures: 0,
            plans_attempted: 0,
            plans_succeeded: 0,
            plans_failed: 0,
            oracle_unavailable: false,
            aborted_reason: None,
        }
    }

    fn absorb(&mut self, outcome: &UserOutcome) {
        if outcome.skipped {
            self.users_skipped += 1;
        }
        self.positions_read += outcome.positions_read;
        self.read_failures += outcome.read_failures;
        self.plans_attempted += outcome.attempted;
        self.plans_succeeded += outcome.succeeded;
        self.plans_failed += outcome.failed;
    }

    pub fn has_failures(&self) -> bool {
        self.plans_failed > 0
            || self.users_aborted > 0
            || self.oracle_unavailable
            || self.aborted_reason.is_some()
    }

    pub fn summary(&self) -> String {
        format!(
            "用户 {} (跳过 {}, 异常 {}), 仓位 {} (读取失败 {}), 计划 {} 成功 {} 失败 {}{}",
            self.users_total,
            self.users_skipped,
            self.users_aborted,
            self.positions_read,
            self.read_failures,
            self.plans_attempted,
            self.plans_succeeded,
            self.plans_failed,
            if self.oracle_unavailable {
                ", 收益率服务不可用"
            } else {
                ""
            }
        )
    }
}

#[derive(Debug, Default)]
struct UserOutcome {
    skipped: bool,
    positions_read: usize,
    read_failures: usize,
    attempted: usize,
    succeeded: usize,
    failed: usize,
}

/// 单个用户准备好的计划
pub struct PreparedUser {
    pub account: UserAccount,
    pub wallet: WalletHandle,
    pub readout: PositionReadout,
    pub plans: Vec<RebalancePlan>,
}

/// 批量调仓：一次快照，逐用户规划并执行
pub struct BatchRunner {
    name: String,
    store: Arc<dyn WalletStore>,
    oracle: Arc<dyn YieldOracle>,
    reader: PositionReader,
    orchestrator: ExecutionOrchestrator,
    retry: RetryConfig,
    max_concurrent_users: usize,
    notifier: Option<Arc<WebhookNotifier>>,
}

impl BatchRunner {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn WalletStore>,
        oracle: Arc<dyn YieldOracle>,
        reader: PositionReader,
        orchestrator: ExecutionOrchestrator,
        retry: RetryConfig,
        max_concurrent_users: usize,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            oracle,
            reader,
            orchestrator,
            retry,
            max_concurrent_users: max_concurrent_users.max(1),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<WebhookNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn orchestrator(&self) -> &ExecutionOrchestrator {
        &self.orchestrator
    }

    /// 拉取本周期的报价快照（带退避重试）
    pub async fn capture_snapshot(&self) -> Result<Arc<QuoteSnapshot>> {
        let policy = ExponentialBackoffRetry::new(self.retry.clone());
        let oracle = self.oracle.clone();
        let snapshot = policy
            .execute_with_retry(|| {
                let oracle = oracle.clone();
                async move { oracle.fetch_quotes().await }
            })
            .await?;
        Ok(Arc::new(snapshot))
    }

    /// 加载钱包、读取仓位并生成计划，不执行
    pub async fn prepare_user(
        &self,
        user: &Address,
        snapshot: &QuoteSnapshot,
    ) -> Result<PreparedUser> {
        let record = self.store.wallet_record(user).await?;
        let risk_tier = record.risk_tier()?;
        let wallet = self
            .orchestrator
            .custody()
            .import_wallet(&record)
            .await
            .map_err(|err| match err {
                RebalanceError::ApiError { code: 404, .. } => {
                    RebalanceError::NoWalletFound(user.clone())
                }
                other => other,
            })?;

        let readout = self
            .reader
            .read_positions(user, &wallet.default_address, snapshot)
            .await;
        let plans = planner::plan_user(user, &readout.positions, risk_tier, snapshot);

        Ok(PreparedUser {
            account: UserAccount {
                address: user.clone(),
                risk_tier,
            },
            wallet,
            readout,
            plans,
        })
    }

    /// 只规划不执行
    pub async fn plan_cycle(&self) -> Result<Vec<RebalancePlan>> {
        let users = self.store.user_addresses().await?;
        let snapshot = self.capture_snapshot().await?;

        let mut plans = Vec::new();
        for user in &users {
            match self.prepare_user(user, &snapshot).await {
                Ok(prepared) => plans.extend(prepared.plans),
                Err(err) => log::warn!("[rebalance] 跳过用户 {}: {}", user, err),
            }
        }
        Ok(plans)
    }

    /// 执行一个完整周期；单个用户或仓位的错误不会中断周期
    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let mut report = CycleReport::new(Utc::now());

        let users = match self.store.user_addresses().await {
            Ok(users) => users,
            Err(err) => {
                log::error!("[rebalance] 读取用户列表失败: {}", err);
                report.aborted_reason = Some(err.to_string());
                report.finished_at = Utc::now();
                return report;
            }
        };
        report.users_total = users.len();

        let snapshot = match self.capture_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::error!("[rebalance] 获取收益率快照失败，本周期不调仓: {}", err);
                report.oracle_unavailable = true;
                report.finished_at = Utc::now();
                self.notify(
                    "收益率服务不可用",
                    &format!("本周期跳过 {} 个用户\n{}", users.len(), err),
                    MessageLevel::Warning,
                )
                .await;
                return report;
            }
        };
        log::info!(
            "[rebalance] 周期开始: {} 个用户, {} 条报价 (快照时间 {})",
            users.len(),
            snapshot.len(),
            snapshot.captured_at().format("%Y-%m-%d %H:%M:%S UTC")
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_users));
        let mut tasks = JoinSet::new();
        for user in users {
            let runner = Arc::clone(self);
            let semaphore = semaphore.clone();
            let snapshot = snapshot.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return UserOutcome::default(),
                };
                runner.process_user(&user, &snapshot).await
            });
        }

        // 每个用户独立任务，panic 只影响该用户
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(&outcome),
                Err(err) => {
                    log::error!("[rebalance] ❌ 用户任务异常退出: {}", err);
                    report.users_aborted += 1;
                }
            }
        }

        report.finished_at = Utc::now();
        log::info!("[rebalance] 周期结束: {}", report.summary());
        if report.plans_failed > 0 || report.users_aborted > 0 {
            self.notify("调仓周期存在失败", &report.summary(), MessageLevel::Error)
                .await;
        }
        report
    }

    async fn process_user(&self, user: &Address, snapshot: &QuoteSnapshot) -> UserOutcome {
        let mut outcome = UserOutcome::default();

        let prepared = match self.prepare_user(user, snapshot).await {
            Ok(prepared) => prepared,
            Err(err) => {
                match err.severity() {
                    ErrorSeverity::Info | ErrorSeverity::Warning => {
                        log::warn!("[rebalance] ⚠️ 跳过用户 {}: {}", user, err)
                    }
                    _ => log::error!("[rebalance] ❌ 跳过用户 {}: {}", user, err),
                }
                outcome.skipped = true;
                return outcome;
            }
        };

        outcome.positions_read = prepared.readout.positions.len();
        outcome.read_failures = prepared.readout.failed_protocols.len();

        if prepared.plans.is_empty() {
            log::debug!(
                "[rebalance] 用户 {} ({}) 无需调仓, {} 个仓位",
                user,
                prepared.account.risk_tier,
                outcome.positions_read
            );
            return outcome;
        }

        // 同一钱包的计划顺序执行
        for plan in &prepared.plans {
            outcome.attempted += 1;
            match self.orchestrator.execute(&prepared.wallet, plan).await {
                Ok(receipt) => {
                    outcome.succeeded += 1;
                    log::info!(
                        "[rebalance] ✅ 用户 {} 调仓完成: {} -> {}, 交易 {}",
                        user,
                        plan.from_protocol,
                        plan.to_protocol,
                        receipt.transaction_id().map(String::as_str).unwrap_or("-")
                    );
                }
                Err(err) => {
                    outcome.failed += 1;
                    self.report_failure(user, plan, &err).await;
                }
            }
        }

        outcome
    }

    async fn report_failure(&self, user: &Address, plan: &RebalancePlan, err: &RebalanceError) {
        log::error!(
            "[rebalance] ❌ 用户 {} 调仓失败 ({} -> {}): {}",
            user,
            plan.from_protocol,
            plan.to_protocol,
            err
        );

        if err.is_partial_execution() {
            let body = format!(
                "**用户**: {}\n**来源协议**: {}\n**目标协议**: {}\n**数量**: {:.6}\n**错误**: {}",
                user, plan.from_protocol, plan.to_protocol, plan.amount, err
            );
            self.notify("调仓部分执行，资金可能未质押", &body, MessageLevel::Critical)
                .await;
        }
    }

    async fn notify(&self, title: &str, body: &str, level: MessageLevel) {
        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.send_event(&self.name, title, body, level).await {
                log::warn!("[rebalance] 发送通知失败: {}", err);
            }
        }
    }
}
