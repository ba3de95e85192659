//! Core error kinds surfaced by the dispatch engine (§7).
//!
//! Call sites match on kind to decide retry vs. disconnect vs. abort;
//! `crate::Error`/`crate::Result` (the boxed-trait-object convention used
//! throughout this crate) still carry these across `?` boundaries.

use std::fmt;

/// One of the five error kinds the engine distinguishes.
#[derive(Debug)]
pub enum EngineError {
    /// recv/send/accept failure. Transient (`EAGAIN`) is handled by the
    /// caller before this is ever constructed; this variant is for the
    /// non-transient case, which increments the peer's `err_count`.
    Transport(std::io::Error),

    /// Over-length frame, illegal state transition, or unknown frame type.
    /// Always fatal for the peer that caused it.
    Protocol(String),

    /// Free-slot stack empty on accept, or the UDP bucket table is full.
    /// The new connection is dropped; existing peers are unaffected.
    ResourceExhausted(String),

    /// TUN open/ioctl failure, socket bind/listen failure, thread creation
    /// failure. Fatal for the whole server.
    System(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Transport(e) => write!(f, "transport error: {}", e),
            EngineError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            EngineError::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            EngineError::System(msg) => write!(f, "system error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Whether this error should disconnect the peer immediately, independent
    /// of its error budget (§4.3, §7).
    pub fn is_fatal_for_peer(&self) -> bool {
        matches!(self, EngineError::Protocol(_))
    }
}
