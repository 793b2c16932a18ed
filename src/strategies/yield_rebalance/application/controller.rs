use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::config::{AppConfig, ScheduleConfig};
use crate::core::retry_policy::RetryConfig;
use crate::strategies::common::{
    Strategy, StrategyDeps, StrategyInstance, StrategyState, StrategyStatus,
};
use crate::strategies::yield_rebalance::infrastructure::abi::AbiSet;
use crate::strategies::yield_rebalance::infrastructure::position_reader::PositionReader;

use super::orchestrator::ExecutionOrchestrator;
use super::runner::{BatchRunner, CycleReport};

/// 到下一个整点（按 interval 对齐）的等待时长
pub fn delay_until_next_boundary(now: DateTime<Utc>, interval_secs: u64) -> Duration {
    let interval_ms = interval_secs.max(1) as i64 * 1000;
    let now_ms = now.timestamp_millis();
    let next_ms = (now_ms.div_euclid(interval_ms) + 1) * interval_ms;
    Duration::from_millis((next_ms - now_ms) as u64)
}

/// 定时调仓策略：按周期触发 BatchRunner，同一时刻只跑一个周期
#[derive(Clone)]
pub struct RebalanceStrategy {
    name: String,
    schedule: ScheduleConfig,
    runner: Arc<BatchRunner>,
    running: Arc<RwLock<bool>>,
    status: Arc<RwLock<StrategyStatus>>,
    last_report: Arc<RwLock<Option<CycleReport>>>,
    cycle_guard: Arc<Mutex<()>>,
    started_at: Arc<RwLock<Option<Instant>>>,
    task_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RebalanceStrategy {
    pub fn with_runner(
        name: impl Into<String>,
        schedule: ScheduleConfig,
        runner: Arc<BatchRunner>,
    ) -> Self {
        let name = name.into();
        let status = StrategyStatus::new(name.clone()).with_state(StrategyState::Initializing);
        Self {
            name,
            schedule,
            runner,
            running: Arc::new(RwLock::new(false)),
            status: Arc::new(RwLock::new(status)),
            last_report: Arc::new(RwLock::new(None)),
            cycle_guard: Arc::new(Mutex::new(())),
            started_at: Arc::new(RwLock::new(None)),
            task_handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn runner(&self) -> &Arc<BatchRunner> {
        &self.runner
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// 触发一个周期；已有周期在跑时跳过并返回 None
    pub async fn trigger(&self) -> Option<CycleReport> {
        let _guard = match self.cycle_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::warn!("[rebalance] ⚠️ 上一个周期仍在执行，跳过本次触发");
                return None;
            }
        };

        let report = self.runner.run_cycle().await;

        {
            let mut status = self.status.write().await;
            status.cycles_completed += 1;
            status.last_summary = Some(report.summary());
            status.updated_at = Utc::now();
            status.last_error = if report.oracle_unavailable {
                Some("收益率服务不可用".to_string())
            } else if let Some(reason) = &report.aborted_reason {
                Some(reason.clone())
            } else if report.plans_failed > 0 {
                Some(format!("{} 个计划执行失败", report.plans_failed))
            } else {
                None
            };
        }
        *self.last_report.write().await = Some(report.clone());

        Some(report)
    }

    async fn spawn_scheduler(&self) {
        let strategy = self.clone();
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(strategy.schedule.interval_secs.max(1));
            let first_delay = if strategy.schedule.align_to_interval {
                delay_until_next_boundary(Utc::now(), strategy.schedule.interval_secs)
            } else {
                period
            };
            log::info!(
                "[rebalance] 调度器启动: 周期 {}s, 首次触发在 {:.0}s 后",
                period.as_secs(),
                first_delay.as_secs_f64()
            );

            if strategy.schedule.run_on_start {
                strategy.spawn_cycle().await;
            }

            let start = tokio::time::Instant::now() + first_delay;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !*strategy.running.read().await {
                    break;
                }
                strategy.spawn_cycle().await;
            }
        });

        self.task_handles.lock().await.push(handle);
    }

    /// 周期在独立任务里跑，调度循环不被阻塞，重叠由 trigger 判定
    async fn spawn_cycle(&self) {
        let strategy = self.clone();
        let handle = tokio::spawn(async move {
            let _ = strategy.trigger().await;
        });

        let mut handles = self.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

impl Strategy for RebalanceStrategy {
    type Config = Arc<AppConfig>;

    fn create(config: Self::Config, deps: StrategyDeps) -> Result<Self>
    where
        Self: Sized,
    {
        let network = Arc::new(config.network.resolve()?);
        let abis = AbiSet::load(&config.abi)?;

        let orchestrator = ExecutionOrchestrator::new(
            deps.custody.clone(),
            abis,
            network,
            config.execution.clone(),
            Duration::from_secs(config.custody.confirmation_timeout_secs),
        );
        let reader = PositionReader::new(deps.chain_reader.clone(), config.chain.amount_decimals);

        let mut runner = BatchRunner::new(
            config.strategy.name.clone(),
            deps.wallet_store.clone(),
            deps.yield_oracle.clone(),
            reader,
            orchestrator,
            RetryConfig::from(&config.retry),
            config.execution.max_concurrent_users,
        );
        if let Some(notifier) = deps.notifier.clone() {
            runner = runner.with_notifier(notifier);
        }

        Ok(Self::with_runner(
            config.strategy.name.clone(),
            config.schedule.clone(),
            Arc::new(runner),
        ))
    }
}

#[async_trait]
impl StrategyInstance for RebalanceStrategy {
    async fn start(&self) -> Result<()> {
        let mut running_guard = self.running.write().await;
        if *running_guard {
            return Ok(());
        }
        *running_guard = true;
        drop(running_guard);

        *self.started_at.write().await = Some(Instant::now());
        {
            let mut status = self.status.write().await;
            status.state = StrategyState::Running;
            status.updated_at = Utc::now();
        }

        log::info!("[rebalance] 策略 {} 启动", self.name);
        self.spawn_scheduler().await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        // 进行中的周期会在最后一个已确认步骤之后被放弃
        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }

        let mut status = self.status.write().await;
        status.state = StrategyState::Stopped;
        status.updated_at = Utc::now();
        log::info!("[rebalance] 策略 {} 已停止", self.name);
        Ok(())
    }

    async fn status(&self) -> Result<StrategyStatus> {
        let mut status = self.status.read().await.clone();
        if let Some(started) = *self.started_at.read().await {
            status = status.with_uptime(started.elapsed());
        }
        Ok(status)
    }
}
