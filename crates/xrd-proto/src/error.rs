//! Parse and framing errors.

use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The buffer is shorter than the structure it is supposed to hold.
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum length required
        expected: usize,
        /// Length available
        actual: usize,
    },

    /// Declared body length exceeds the framing limit.
    #[error("frame body of {size} bytes exceeds the limit of {limit}")]
    FrameTooLarge {
        /// Declared body length
        size: u32,
        /// Maximum accepted body length
        limit: u32,
    },

    /// The request id of a message is not one this client speaks.
    #[error("unknown request id: {0}")]
    UnknownRequest(u16),

    /// A response body does not have the layout its status implies.
    #[error("malformed response body: {0}")]
    MalformedBody(&'static str),

    /// Handshake exchange failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(&'static str),

    /// Login exchange failed.
    #[error("login failed: {0}")]
    LoginFailed(&'static str),

    /// Socket-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
