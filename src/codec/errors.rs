//! Frame parsing and validation errors
//!
//! Defines error types that can occur during frame parsing, validation, and
//! decryption operations. All errors implement the standard Error trait for
//! proper error propagation.

use std::fmt;
use std::fmt::Display;

/// Frame parsing and processing errors
#[derive(Debug)]
pub enum FrameError {
    /// Buffer does not yet hold a complete frame; caller should read more bytes.
    TooShort,

    /// Header declares a payload longer than the 4096-byte maximum.
    ///
    /// This is a fatal, protocol-level error per §4.2/§4.3: the peer that sent it is
    /// disconnected unconditionally, independent of its error budget.
    OverLength,

    /// Frame type byte does not match any known variant.
    UnknownType(u8),

    /// Payload failed to decode once its length prefix validated.
    Invalid,

    /// Payload decryption failed (tampering, wrong key, truncated ciphertext).
    DecryptionFailed(crate::Error),
}

impl std::error::Error for FrameError {}

impl Display for FrameError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::TooShort => "stream ended early".fmt(fmt),
            FrameError::OverLength => "frame length exceeds 4096 bytes".fmt(fmt),
            FrameError::UnknownType(t) => write!(fmt, "unknown frame type {}", t),
            FrameError::Invalid => "invalid frame".fmt(fmt),
            FrameError::DecryptionFailed(e) => write!(fmt, "decryption failed: {}", e),
        }
    }
}

impl FrameError {
    /// Whether this error is always fatal for the owning peer, independent of err_count (§7).
    pub fn is_protocol_fatal(&self) -> bool {
        matches!(self, FrameError::OverLength | FrameError::UnknownType(_))
    }
}
