//! Core constants for the card-read session coordinator.
//!
//! Values here are the defaults of the reference deployment. Anything an
//! operator may want to tune is also exposed through the CLI configuration,
//! which falls back to these constants.
//!
//! # Usage
//!
//! ```
//! use rollcall_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(DEFAULT_READER_PORT, 65432);
//!
//! let window = Duration::from_millis(DEFAULT_WINDOW_TIMEOUT_MS);
//! assert_eq!(window.as_secs(), 5);
//! ```

// ============================================================================
// Reader Transport
// ============================================================================

/// Loopback address the reader listener binds to.
///
/// The reader process is the only expected client, so the listener is never
/// exposed beyond localhost.
pub const DEFAULT_READER_HOST: &str = "127.0.0.1";

/// TCP port the reader listener binds to.
pub const DEFAULT_READER_PORT: u16 = 65432;

/// Maximum simultaneous reader connections accepted by the listener.
pub const DEFAULT_MAX_READER_CONNECTIONS: usize = 4;

/// Delay between binding the listener and reporting it as listening (milliseconds).
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// Delay between the listener coming up and launching the reader process (milliseconds).
pub const DEFAULT_LAUNCH_DELAY_MS: u64 = 4000;

/// Fixed delay between reader process restart attempts (milliseconds).
///
/// # Value: 10000ms (10 seconds)
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 10_000;

/// Reader process restarts allowed before escalating to a full listener restart.
///
/// The first five counted failures each restart the reader process. The
/// sixth tears down and rebinds the listener instead.
///
/// # Value: 5
pub const DEFAULT_MAX_RESTARTS: u32 = 5;

/// Maximum size of a single JSON object on the reader wire (bytes).
///
/// # Value: 64 KB
pub const MAX_READER_FRAME_SIZE: usize = 64 * 1024;

// ============================================================================
// Session Timing
// ============================================================================

/// Lifetime of a pending window (milliseconds).
///
/// Applies to the CheckIn auto-commit window and to the Authenticate and
/// Enroll attempt windows.
///
/// # Value: 5000ms (5 seconds)
pub const DEFAULT_WINDOW_TIMEOUT_MS: u64 = 5000;

/// Delay before re-arming reads after an unknown card in CheckIn (milliseconds).
///
/// This is also how long the assign-new-user offer stays valid.
pub const DEFAULT_REARM_DELAY_MS: u64 = 5000;

// ============================================================================
// Operational Day
// ============================================================================

/// Start of the operational day, as `(hour, minute, second)` on the calendar date.
pub const OPERATIONAL_DAY_START: (u32, u32, u32) = (0, 7, 0);

/// End of the operational day, as `(hour, minute, second)` on the following calendar date.
pub const OPERATIONAL_DAY_END: (u32, u32, u32) = (6, 59, 59);

// ============================================================================
// Listings
// ============================================================================

/// Number of attendance log rows per page.
pub const LOG_PAGE_SIZE: u32 = 20;

/// Minimum student number length (characters).
pub const MIN_STUDENT_NUMBER_LENGTH: usize = 1;

/// Maximum student number length (characters).
pub const MAX_STUDENT_NUMBER_LENGTH: usize = 32;
