use std::fmt;
use std::io;
use std::path::PathBuf;

/// The session operation an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Handshake,
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handshake => "handshake",
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Errors from building the TLS engine and its trust policy.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read trust anchor bundle {}: {source}", .path.display())]
    TrustAnchorRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid trust anchor bundle {}: {reason}", .path.display())]
    TrustAnchorParse { path: PathBuf, reason: String },

    #[error("trust anchor bundle {} contains no certificates", .path.display())]
    NoTrustAnchors { path: PathBuf },

    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    #[error("invalid session setting: {0}")]
    InvalidSetting(&'static str),

    #[error("cannot build certificate verifier: {0}")]
    Verifier(#[from] rustls::client::VerifierBuilderError),

    #[error("cannot create TLS engine: {0}")]
    Engine(#[source] rustls::Error),
}

/// Errors from establishing (or re-establishing) the secure channel.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("peer certificate rejected: {0}")]
    CertificateRejected(String),

    #[error("handshake protocol failure: {0}")]
    Protocol(String),

    #[error("peer closed the connection during the handshake")]
    PeerClosed,

    #[error("transport failed during the handshake: {0}")]
    Io(#[source] io::Error),

    #[error("handshake did not complete after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Errors from reading or writing an established session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("TLS protocol error during {op}: {reason}")]
    Protocol { op: Operation, reason: String },

    #[error("transport I/O error during {op}: {source}")]
    Io {
        op: Operation,
        #[source]
        source: io::Error,
    },

    #[error("{0} requires a certificate lookup")]
    CertificateLookup(Operation),

    #[error("{op} did not make progress after {attempts} attempts")]
    RetriesExhausted { op: Operation, attempts: u32 },

    #[error("rehandshake failed: {0}")]
    Rehandshake(#[source] HandshakeError),
}

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failed session initialization.
///
/// The stream passed to initialization is never closed on failure; it is
/// handed back here so the caller keeps ownership of the socket.
pub struct InitError<S> {
    error: Error,
    stream: S,
}

impl<S> InitError<S> {
    pub(crate) fn new(error: impl Into<Error>, stream: S) -> Self {
        Self {
            error: error.into(),
            stream,
        }
    }

    /// The reason initialization failed.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Take back the stream, discarding the error.
    pub fn into_stream(self) -> S {
        self.stream
    }

    pub fn into_parts(self) -> (Error, S) {
        (self.error, self.stream)
    }
}

impl<S> fmt::Debug for InitError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S> fmt::Display for InitError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session initialization failed: {}", self.error)
    }
}

impl<S> std::error::Error for InitError<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<S> From<InitError<S>> for Error {
    fn from(err: InitError<S>) -> Self {
        err.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_error_returns_the_stream() {
        let err = InitError::new(HandshakeError::PeerClosed, vec![1u8, 2, 3]);
        assert_eq!(
            err.to_string(),
            "session initialization failed: peer closed the connection during the handshake"
        );
        let (error, stream) = err.into_parts();
        assert!(matches!(error, Error::Handshake(HandshakeError::PeerClosed)));
        assert_eq!(stream, [1, 2, 3]);
    }

    #[test]
    fn transport_errors_name_the_operation() {
        let err = TransportError::RetriesExhausted {
            op: Operation::Write,
            attempts: 100,
        };
        assert_eq!(err.to_string(), "write did not make progress after 100 attempts");
    }
}
