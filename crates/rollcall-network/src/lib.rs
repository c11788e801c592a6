//! Network layer for the reader link.
//!
//! The coordinator listens on a local TCP port and the card-reader process
//! connects to it as a client, streaming JSON objects (see
//! `rollcall_protocol`). This crate owns both ends of that link.
//!
//! # Components
//!
//! - **ReaderListener**: accepts reader connections and turns the byte
//!   stream into [`ListenerEvent`]s on an mpsc channel
//! - **ReaderClient**: connects to a listener and writes reader messages;
//!   used by the `simulate` command and by tests
//!
//! # Example
//!
//! ```no_run
//! use rollcall_network::{ListenerConfig, ReaderListener};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = ReaderListener::bind(ListenerConfig::default()).await?;
//! let (tx, mut rx) = mpsc::channel(32);
//! let handle = listener.spawn(tx);
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! handle.stop();
//! # Ok(())
//! # }
//! ```

mod client;
mod listener;

pub use client::{ReaderClient, ReaderClientConfig, ReaderClientError};
pub use listener::{
    DisconnectReason, ListenerConfig, ListenerError, ListenerEvent, ListenerHandle,
    ReaderListener,
};
