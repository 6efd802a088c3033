// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the session wire protocol engine.
//!
//! None of these are retried internally (spec §7): every error surfaces to
//! the caller, either as a `Result::Err` return or, for asynchronous
//! lifecycle failures, via a [`crate::context::Context`] callback.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All error kinds the engine can surface.
#[derive(Debug)]
pub enum Error {
    /// Attempted an operation that violates the protocol state machine
    /// (e.g. `login()` while already `LoggedIn`).
    IllegalState,
    /// Inbound frame declared a version other than [`crate::config::MSG_VERSION`].
    BadMsgVersion,
    /// Inbound frame declared a service id outside {APPLICATION, CHANNEL}.
    BadMsgService,
    /// Inbound frame declared an opcode not valid for its service.
    BadMsgOpcode,
    /// A caller-supplied byte array exceeds `u16::MAX` where a `u16`-prefixed
    /// field is required.
    SizeArgTooLarge,
    /// `drive()` was called with an fd this connection does not own.
    BadFd,
    /// Server referenced a channel id the client has not joined.
    UnknownChannel,
    /// Outbound ring buffer has no room for the requested write.
    NoBufferSpace,
    /// Message would exceed `SGS_MSG_MAX_LENGTH` on the wire.
    MessageTooLarge,
    /// `drive()` was called while the connection is `Disconnected`.
    NotConnected,
    /// Hostname resolution failed.
    CheckDnsError,
    /// Any other I/O error, propagated verbatim.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IllegalState => write!(f, "operation not valid in current state"),
            Error::BadMsgVersion => write!(f, "unsupported message version"),
            Error::BadMsgService => write!(f, "unknown message service"),
            Error::BadMsgOpcode => write!(f, "unknown opcode for service"),
            Error::SizeArgTooLarge => write!(f, "argument exceeds u16 length field"),
            Error::BadFd => write!(f, "fd not owned by this connection"),
            Error::UnknownChannel => write!(f, "unknown channel id"),
            Error::NoBufferSpace => write!(f, "no buffer space available"),
            Error::MessageTooLarge => write!(f, "message exceeds maximum wire size"),
            Error::NotConnected => write!(f, "not connected"),
            Error::CheckDnsError => write!(f, "hostname resolution failed"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_no_trailing_punctuation() {
        let msgs = [
            Error::IllegalState.to_string(),
            Error::BadMsgVersion.to_string(),
            Error::UnknownChannel.to_string(),
        ];
        for m in msgs {
            assert!(!m.ends_with('.'));
        }
    }

    #[test]
    fn io_error_round_trips_as_source() {
        use std::error::Error as _;
        let io_err = std::io::Error::other("boom");
        let err: Error = io_err.into();
        assert!(err.source().is_some());
    }
}
