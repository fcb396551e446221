//! Error taxonomy for the buffer reader.
//!
//! Only [`ReaderError::BufferSizeNotMultipleOfFour`] is a true usage error
//! returned to the caller. The other conditions named in the design
//! (`UnknownModuleId`, `TgvNotReady`, `SinkBackpressure`, `TransportError`)
//! are handled in place (by logging a warning and continuing, or by normal
//! control flow in [`crate::reader::BufferReader`]), rather than aborting
//! the call, per the propagation policy of a streaming parser that must
//! tolerate a noisy hardware link.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReaderError {
    #[error("input buffer length {0} is not a multiple of 4")]
    BufferSizeNotMultipleOfFour(usize),

    #[error("unknown MFM frame revision {0}")]
    UnknownFrameRevision(u8),
}
