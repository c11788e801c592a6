//! Reader process supervision for the rollcall coordinator.
//!
//! The card reader is an external program that connects back to a local
//! TCP listener (see `rollcall-network`) and streams card messages. This
//! crate keeps that arrangement alive:
//!
//! - [`ReaderProcess`] abstracts the external program, with a real
//!   [`CommandProcess`] and a channel-driven [`MockProcess`]
//! - [`RestartPolicy`] and [`RestartBudget`] decide between restarting the
//!   process and escalating to a listener restart
//! - [`ReaderTransport`] is the supervisor task that ties listener, process,
//!   and policy together and forwards card reads to the session
//!
//! ```no_run
//! use rollcall_reader::{AnyReaderProcess, ReaderTransport, TransportConfig, TransportEvent};
//! use tokio::sync::{mpsc, watch};
//!
//! # async fn example() {
//! let (_gate_tx, gate_rx) = watch::channel(true);
//! let (events_tx, mut events_rx) = mpsc::channel(32);
//!
//! let handle = ReaderTransport::new(
//!     TransportConfig::default(),
//!     AnyReaderProcess::Detached,
//!     gate_rx,
//!     events_tx,
//! )
//! .spawn();
//!
//! while let Some(event) = events_rx.recv().await {
//!     if let TransportEvent::Read(read) = event {
//!         println!("card {}", read.student_number);
//!     }
//! }
//! handle.shutdown().await;
//! # }
//! ```

pub mod error;
pub mod mock;
pub mod policy;
pub mod process;
pub mod traits;
pub mod transport;

pub use error::{ReaderError, Result};
pub use mock::{MockProcess, MockProcessHandle};
pub use policy::{RestartBudget, RestartDecision, RestartPolicy};
pub use process::{AnyReaderProcess, CommandProcess};
pub use traits::{ExitReport, ReaderProcess};
pub use transport::{ReaderTransport, TransportConfig, TransportEvent, TransportHandle};
