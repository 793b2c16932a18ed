use chrono::{DateTime, Utc};
use std::time::Duration;

/// 策略运行状态
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyState {
    Initializing,
    Running,
    Stopped,
    Error,
}

/// 统一的策略状态结构
#[derive(Debug, Clone)]
pub struct StrategyStatus {
    pub name: String,
    pub state: StrategyState,
    pub uptime: Option<Duration>,
    pub cycles_completed: u64,
    pub last_summary: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl StrategyStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: StrategyState::Initializing,
            uptime: None,
            cycles_completed: 0,
            last_summary: None,
            updated_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn with_state(mut self, state: StrategyState) -> Self {
        self.state = state;
        self
    }

    pub fn with_uptime(mut self, uptime: Duration) -> Self {
        self.uptime = Some(uptime);
        self
    }

    pub fn with_last_error(mut self, last_error: impl Into<String>) -> Self {
        self.last_error = Some(last_error.into());
        self
    }
}
