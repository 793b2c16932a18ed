// 工具模块 - 通用工具函数
pub mod logger;
pub mod signature;
pub mod webhook;

pub use logger::init_logger;
pub use signature::*;
pub use webhook::{MessageLevel, WebhookNotifier};
