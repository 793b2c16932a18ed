pub mod controller;
pub mod manual;
pub mod orchestrator;
pub mod runner;

pub use controller::RebalanceStrategy;
pub use manual::ManualOperations;
pub use orchestrator::ExecutionOrchestrator;
pub use runner::{BatchRunner, CycleReport};
