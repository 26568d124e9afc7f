// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Crate-wide error type.
//!
//! Error kinds follow the taxonomy of the PubSub core: configuration and
//! allocation failures are fatal at start-up, while transport, decode,
//! security and application errors are handled locally per tick and never
//! abort a scheduler.

use std::fmt;

/// Errors returned by the PubSub core.
#[derive(Debug)]
pub enum Error {
    /// Malformed or invalid configuration detected at build or start time
    /// (duplicate writer ids, zero-valued ids, a publisher-role connection
    /// with no `PublisherId`, an acyclic connection without keep-alive, a
    /// security mode combined with a fixed-size buffer, ...).
    Configuration(String),
    /// An allocator-style builder call returned `false`/`None`.
    Allocation(String),
    /// Socket send/recv failure. Logged, current tick abandoned.
    Transport(std::io::Error),
    /// A network message was rejected by the decoder.
    Decode(String),
    /// Missing key, signature mismatch, or replay detected.
    Security(String),
    /// A user callback (sink, provider) returned `false` or timed out.
    Application(String),
    /// The Safety Layer's `execute_provider`/`execute_consumer` primitive
    /// returned a non-OK byte status.
    Safety(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(reason) => write!(f, "configuration error: {reason}"),
            Error::Allocation(reason) => write!(f, "allocation failed: {reason}"),
            Error::Transport(err) => write!(f, "transport error: {err}"),
            Error::Decode(reason) => write!(f, "decode error: {reason}"),
            Error::Security(reason) => write!(f, "security error: {reason}"),
            Error::Application(reason) => write!(f, "application callback error: {reason}"),
            Error::Safety(status) => write!(f, "safety layer status: {status}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_variants() {
        assert_eq!(
            Error::Configuration("zero writer id".into()).to_string(),
            "configuration error: zero writer id"
        );
        assert_eq!(Error::Safety(3).to_string(), "safety layer status: 3");
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::other("boom");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Transport(_)));
    }
}
