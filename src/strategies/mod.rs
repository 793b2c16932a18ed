// 策略模块
pub mod common;
pub mod yield_rebalance;

pub use yield_rebalance::{CycleReport, RebalanceStrategy};
