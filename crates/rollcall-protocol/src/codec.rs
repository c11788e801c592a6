//! Tokio codec for the reader wire format.
//!
//! `ReaderCodec` wraps the [`ObjectScanner`] and plugs it into
//! `tokio_util::codec::FramedRead`/`Framed`:
//!
//! ```text
//! TCP Stream -> ObjectScanner -> serde_json -> ReaderMessage
//! ReaderMessage -> serde_json + '\n' -> TCP Stream
//! ```
//!
//! A framed stream stops at the first decoder error, so per-message failures
//! (bad JSON, oversized objects) are returned as `Ok(Some(Err(ParseError)))`
//! and the connection keeps going. Only I/O errors end the stream.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tokio::net::TcpStream;
//! use tokio_util::codec::FramedRead;
//! use rollcall_protocol::ReaderCodec;
//!
//! # async fn example() -> rollcall_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:65432").await?;
//! let mut frames = FramedRead::new(stream, ReaderCodec::new());
//!
//! while let Some(item) = frames.next().await {
//!     match item? {
//!         Ok(message) => println!("{}", message.kind()),
//!         Err(e) => eprintln!("dropped: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use bytes::BytesMut;
use rollcall_core::constants::MAX_READER_FRAME_SIZE;
use rollcall_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{ParseError, ReaderMessage};
use crate::stream_parser::{ObjectScanner, Scanned};

/// One decoded item: a message, or the reason one was dropped.
pub type Decoded = std::result::Result<ReaderMessage, ParseError>;

#[derive(Debug)]
pub struct ReaderCodec {
    scanner: ObjectScanner,
    max_frame_size: usize,
}

impl ReaderCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_READER_FRAME_SIZE)
    }

    /// Codec with a custom per-object size limit, applied to both directions.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            scanner: ObjectScanner::with_max_object_size(max_frame_size),
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Non-whitespace bytes skipped between objects so far.
    pub fn discarded_bytes(&self) -> usize {
        self.scanner.discarded_bytes()
    }
}

impl Default for ReaderCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ReaderCodec {
    type Item = Decoded;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !src.is_empty() {
            // The scanner owns buffering from here on.
            self.scanner.feed(src);
            src.clear();
        }

        let decoded = match self.scanner.next_object() {
            Some(Scanned::Object(bytes)) => ReaderMessage::from_json(&bytes),
            Some(Scanned::Overflow { size }) => Err(ParseError::FrameTooLarge {
                size,
                max_size: self.max_frame_size,
            }),
            None => return Ok(None),
        };

        Ok(Some(decoded))
    }
}

impl Encoder<ReaderMessage> for ReaderCodec {
    type Error = Error;

    fn encode(&mut self, item: ReaderMessage, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&item)
            .map_err(|e| Error::InvalidMessageFormat(e.to_string()))?;

        if json.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: json.len(),
                max_size: self.max_frame_size,
            });
        }

        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
