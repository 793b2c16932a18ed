pub mod core;
pub mod strategies;
pub mod utils;

pub use crate::core::{config::*, error::*, types::*};
pub use strategies::*;
