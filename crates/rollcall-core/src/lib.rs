pub mod constants;
pub mod day;
pub mod error;
pub mod types;

pub use day::OperationalDay;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
