pub mod codec;
pub mod message;
pub mod stream_parser;

pub use codec::{Decoded, ReaderCodec};
pub use message::{CardPayload, ParseError, ReaderMessage};
pub use stream_parser::{ObjectScanner, ScannerState, Scanned};
