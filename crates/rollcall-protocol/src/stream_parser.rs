//! Stream scanner for JSON objects on the reader wire.
//!
//! The reader process writes one JSON object per card event. Objects may be
//! newline-delimited or simply concatenated, and TCP may split or merge them
//! arbitrarily. This module finds object boundaries without parsing the
//! object itself; parsing happens once a complete object is available.
//!
//! # Usage
//!
//! ```
//! use rollcall_protocol::{ObjectScanner, Scanned};
//!
//! let mut scanner = ObjectScanner::new();
//!
//! scanner.feed(br#"{"type":"rel"#);
//! assert!(scanner.next_object().is_none());
//!
//! scanner.feed(br#"eased"}{"type":"released"}"#);
//! assert!(matches!(scanner.next_object(), Some(Scanned::Object(_))));
//! assert!(matches!(scanner.next_object(), Some(Scanned::Object(_))));
//! assert!(scanner.next_object().is_none());
//! ```

use bytes::{Bytes, BytesMut};
use rollcall_core::constants::MAX_READER_FRAME_SIZE;

/// Initial buffer capacity for incoming TCP data.
const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// State machine states for scanning JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    /// Skipping bytes until an opening `{`.
    ///
    /// Whitespace and newlines between objects are expected here; anything
    /// else is counted as discarded.
    WaitingStart,

    /// Inside an object, tracking nesting depth and string literals until
    /// the matching closing brace.
    ReadingObject,
}

/// Result of scanning the buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scanned {
    /// Raw bytes of one complete, brace-balanced object.
    Object(Bytes),

    /// An object grew past the size limit before closing and was dropped.
    Overflow { size: usize },
}

/// Stateful scanner for brace-balanced JSON objects.
///
/// ```text
/// ┌─────────────┐  '{'   ┌───────────────┐ depth == 0 ┌──────────────┐
/// │WaitingStart │───────>│ReadingObject  │───────────>│Object ready  │
/// └─────────────┘        └───────────────┘            └──────────────┘
///       ^  │ other bytes        │ size > limit               │
///       │  │ (discarded)        │ (Overflow, resync)         │
///       └──┴────────────────────┴────────────────────────────┘
/// ```
///
/// Braces and brackets inside string literals (including escaped quotes)
/// do not affect depth.
#[derive(Debug)]
pub struct ObjectScanner {
    buffer: BytesMut,
    state: ScannerState,
    /// Bytes of the current object already examined.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    max_object_size: usize,
    discarded: usize,
}

impl ObjectScanner {
    pub fn new() -> Self {
        Self::with_max_object_size(MAX_READER_FRAME_SIZE)
    }

    pub fn with_max_object_size(max_object_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: ScannerState::WaitingStart,
            scanned: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            max_object_size,
            discarded: 0,
        }
    }

    /// Append bytes read from the stream.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract the next complete object, if the buffer holds one.
    pub fn next_object(&mut self) -> Option<Scanned> {
        loop {
            match self.state {
                ScannerState::WaitingStart => {
                    if !self.handle_waiting_start() {
                        return None;
                    }
                }
                ScannerState::ReadingObject => return self.handle_reading_object(),
            }
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// Number of non-whitespace bytes skipped outside of any object.
    pub fn discarded_bytes(&self) -> usize {
        self.discarded
    }

    /// Number of bytes buffered but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    /// Drop all buffered bytes and return to `WaitingStart`.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.reset_object();
    }

    fn handle_waiting_start(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == b'{') {
            Some(pos) => {
                self.discard(pos);
                self.state = ScannerState::ReadingObject;
                self.scanned = 0;
                true
            }
            None => {
                self.discard(self.buffer.len());
                false
            }
        }
    }

    fn discard(&mut self, count: usize) {
        let skipped = self.buffer.split_to(count);
        self.discarded += skipped.iter().filter(|b| !b.is_ascii_whitespace()).count();
    }

    fn handle_reading_object(&mut self) -> Option<Scanned> {
        while self.scanned < self.buffer.len() {
            let byte = self.buffer[self.scanned];
            self.scanned += 1;

            if self.advance(byte) {
                let object = self.buffer.split_to(self.scanned).freeze();
                self.reset_object();
                return Some(Scanned::Object(object));
            }

            if self.scanned > self.max_object_size {
                let size = self.scanned;
                let _ = self.buffer.split_to(self.scanned);
                self.reset_object();
                return Some(Scanned::Overflow { size });
            }
        }
        None
    }

    /// Feed one byte to the depth tracker. Returns `true` when the object closes.
    fn advance(&mut self, byte: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return false;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth = self.depth.saturating_sub(1);
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }

    fn reset_object(&mut self) {
        self.state = ScannerState::WaitingStart;
        self.scanned = 0;
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }
}

impl Default for ObjectScanner {
    fn default() -> Self {
        Self::new()
    }
}
