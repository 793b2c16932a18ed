pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{BatchRunner, CycleReport, ExecutionOrchestrator, ManualOperations, RebalanceStrategy};
