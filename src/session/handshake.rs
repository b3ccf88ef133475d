use std::io;

use crate::engine::{EngineError, TlsEngine};
use crate::error::HandshakeError;

use super::retry::RetryPolicy;

impl From<EngineError> for HandshakeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Protocol(rustls::Error::InvalidCertificate(reason)) => {
                Self::CertificateRejected(reason.to_string())
            }
            EngineError::Protocol(err) => Self::Protocol(err.to_string()),
            EngineError::ZeroReturn => Self::PeerClosed,
            EngineError::Pull(err) | EngineError::Push(err)
                if err.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Self::PeerClosed
            }
            EngineError::Pull(err) | EngineError::Push(err) => Self::Io(err),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Drive the engine's handshake to completion.
///
/// Transient conditions are retried according to `policy`; anything else
/// aborts the handshake.
pub fn complete<E: TlsEngine>(engine: &mut E, policy: &RetryPolicy) -> Result<(), HandshakeError> {
    let mut failures = 0u32;
    loop {
        match engine.handshake() {
            Ok(()) => return Ok(()),
            Err(err) if err.is_transient() => {
                failures += 1;
                tracing::trace!(attempt = failures, condition = %err, "handshake would block");
                if !policy.pause(failures) {
                    tracing::warn!(attempts = failures, "handshake retries exhausted");
                    return Err(HandshakeError::RetriesExhausted { attempts: failures });
                }
            }
            Err(err) => {
                let err = HandshakeError::from(err);
                tracing::warn!(error = %err, "handshake failed");
                return Err(err);
            }
        }
    }
}
