pub mod model;
pub mod planner;

pub use crate::core::network;

pub use model::{
    ExecutionReceipt, ExecutionStep, ProtocolQuote, QuoteSnapshot, RebalancePlan, StakedPosition,
};
pub use network::{Asset, NetworkConfig, NetworkDeployment, Protocol};
