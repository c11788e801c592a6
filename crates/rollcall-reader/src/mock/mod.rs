//! Mock reader process for tests and hardware-free development.

pub mod process;

pub use process::{MockProcess, MockProcessHandle};
