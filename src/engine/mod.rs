//! The capability set a TLS backend offers to a [`Session`](crate::Session).
//!
//! An engine owns the underlying stream and reports every condition that
//! keeps an operation from completing as an [`EngineError`]. The session
//! decides which of those are retried and which are surfaced.

pub mod client;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::io;

/// Negotiated parameters of an established channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeSummary {
    pub protocol_version: Option<rustls::ProtocolVersion>,
    pub cipher_suite: Option<rustls::CipherSuite>,
    /// Hex-encoded SHA-256 of the peer's end-entity certificate.
    pub peer_fingerprint: Option<String>,
}

/// Conditions reported by an engine operation that did not make progress.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine needs more input from the peer")]
    WantRead,

    #[error("engine needs to flush buffered records to the peer")]
    WantWrite,

    #[error("operation was interrupted")]
    Interrupted,

    #[error("peer started a rehandshake")]
    Rehandshake,

    #[error("peer closed the secure channel")]
    ZeroReturn,

    #[error("certificate lookup required")]
    CertificateLookup,

    #[error("push to transport failed: {0}")]
    Push(#[source] io::Error),

    #[error("pull from transport failed: {0}")]
    Pull(#[source] io::Error),

    #[error("TLS protocol error: {0}")]
    Protocol(#[source] rustls::Error),
}

impl EngineError {
    /// Whether retrying the same operation may succeed without any change
    /// of state on the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WantRead | Self::WantWrite | Self::Interrupted)
    }

    /// Classify an error from reading the transport.
    pub fn from_pull(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::WantRead,
            io::ErrorKind::Interrupted => Self::Interrupted,
            _ => Self::Pull(err),
        }
    }

    /// Classify an error from writing the transport.
    pub fn from_push(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::WantWrite,
            io::ErrorKind::Interrupted => Self::Interrupted,
            _ => Self::Push(err),
        }
    }
}

/// A client-role TLS engine bound to a stream.
///
/// Every method performs at most the I/O it needs and returns a transient
/// [`EngineError`] instead of waiting when the stream is not ready. Callers
/// retry transient conditions with the same arguments.
pub trait TlsEngine {
    type Stream;

    /// Advance the handshake. `Ok(())` once it is complete.
    fn handshake(&mut self) -> Result<(), EngineError>;

    /// Receive decrypted application data into `buf`.
    ///
    /// A clean close by the peer is reported as [`EngineError::ZeroReturn`].
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, EngineError>;

    /// Encrypt and transmit application data from `buf`.
    ///
    /// After a transient error the engine may already hold part of `buf`;
    /// retrying with the same `buf` completes that write instead of
    /// duplicating it.
    fn send(&mut self, buf: &[u8]) -> Result<usize, EngineError>;

    /// Forget a partially completed `send` once the caller has given up on
    /// it. Plaintext already accepted is still delivered by later flushes,
    /// but is no longer reported against the next `send`.
    fn abandon_send(&mut self) {}

    /// Decrypted bytes readable without touching the stream.
    fn pending(&mut self) -> usize;

    /// Send a close notification to the peer.
    fn close_notify(&mut self) -> Result<(), EngineError>;

    fn summary(&self) -> Option<HandshakeSummary> {
        None
    }

    fn get_ref(&self) -> &Self::Stream;

    fn get_mut(&mut self) -> &mut Self::Stream;

    /// Release the engine state and give back the stream.
    fn into_stream(self) -> Self::Stream;
}
