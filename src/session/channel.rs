use std::io::{self, Read, Write};
use std::path::Path;

use rustls::ClientConnection;

use crate::engine::client::RustlsEngine;
use crate::engine::{EngineError, HandshakeSummary, TlsEngine};
use crate::error::{ConfigError, Error, InitError, Operation, Result, TransportError};
use crate::trust::{self, TlsMode};

use super::handshake;
use super::retry::RetryPolicy;
use super::SessionConfig;

enum Backend<S, E> {
    Plaintext(S),
    Tls(E),
}

/// A client byte stream over a connected socket, optionally protected by TLS.
///
/// Every operation blocks until it makes progress, fails, or exhausts the
/// session's [`RetryPolicy`] on transient engine conditions.
pub struct Session<S, E = RustlsEngine<S>> {
    backend: Backend<S, E>,
    mode: TlsMode,
    retry: RetryPolicy,
}

impl<S, E> std::fmt::Debug for Session<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<S: Read + Write> Session<S> {
    /// Set up a session over `stream`.
    ///
    /// Without a trust anchor and with `allow_untrusted` unset the session is
    /// plaintext. Otherwise a TLS handshake is performed, verifying the peer
    /// against `trust_anchor` unless `allow_untrusted` is set.
    pub fn initialize(
        stream: S,
        trust_anchor: Option<&Path>,
        allow_untrusted: bool,
    ) -> std::result::Result<Self, InitError<S>> {
        let mut builder = SessionConfig::builder().allow_untrusted(allow_untrusted);
        if let Some(path) = trust_anchor {
            builder = builder.trust_anchor(path);
        }
        match builder.build() {
            Ok(config) => Self::with_config(stream, &config),
            Err(err) => Err(InitError::new(err, stream)),
        }
    }

    /// Set up a session over `stream` as described by `config`.
    pub fn with_config(
        stream: S,
        config: &SessionConfig,
    ) -> std::result::Result<Self, InitError<S>> {
        let mode = config.mode();
        let client_config = match trust::client_config(config) {
            Ok(Some(client_config)) => client_config,
            Ok(None) => {
                tracing::debug!(%mode, "session initialized without TLS");
                return Ok(Self {
                    backend: Backend::Plaintext(stream),
                    mode,
                    retry: config.retry_policy.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(%mode, error = %err, "cannot configure TLS engine");
                return Err(InitError::new(err, stream));
            }
        };

        let server_name = match trust::server_name(config) {
            Ok(name) => name,
            Err(err) => return Err(InitError::new(err, stream)),
        };
        let conn = match ClientConnection::new(client_config, server_name) {
            Ok(conn) => conn,
            Err(err) => return Err(InitError::new(ConfigError::Engine(err), stream)),
        };

        Session::establish(
            RustlsEngine::new(conn, stream),
            mode,
            config.retry_policy.clone(),
        )
    }
}

impl<S, E> Session<S, E>
where
    S: Read + Write,
    E: TlsEngine<Stream = S>,
{
    /// Complete the handshake of an engine bound to a stream.
    ///
    /// On failure the engine is released and its stream handed back.
    pub fn establish(
        mut engine: E,
        mode: TlsMode,
        retry: RetryPolicy,
    ) -> std::result::Result<Self, InitError<S>> {
        if !mode.is_tls() {
            return Err(InitError::new(
                ConfigError::InvalidSetting("an engine requires a TLS mode"),
                engine.into_stream(),
            ));
        }
        if let Err(err) = handshake::complete(&mut engine, &retry) {
            return Err(InitError::new(err, engine.into_stream()));
        }

        match engine.summary() {
            Some(summary) => tracing::debug!(
                %mode,
                version = ?summary.protocol_version,
                suite = ?summary.cipher_suite,
                peer = summary.peer_fingerprint.as_deref().unwrap_or("-"),
                "TLS session established"
            ),
            None => tracing::debug!(%mode, "TLS session established"),
        }

        Ok(Self {
            backend: Backend::Tls(engine),
            mode,
            retry,
        })
    }

    pub fn mode(&self) -> TlsMode {
        self.mode
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Negotiated parameters, `None` in plaintext mode.
    pub fn handshake_summary(&self) -> Option<HandshakeSummary> {
        match &self.backend {
            Backend::Plaintext(_) => None,
            Backend::Tls(engine) => engine.summary(),
        }
    }

    /// Read into `buf`.
    ///
    /// Returns `Ok(0)` for an empty `buf` or once the peer has closed the
    /// channel in an orderly way.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let engine = match &mut self.backend {
            Backend::Plaintext(stream) => return Ok(stream.read(buf)?),
            Backend::Tls(engine) => engine,
        };
        if buf.is_empty() {
            return Ok(0);
        }
        transfer(engine, &self.retry, Operation::Read, |engine| engine.recv(buf))
    }

    /// Write from `buf`, returning how many bytes were accepted.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let engine = match &mut self.backend {
            Backend::Plaintext(stream) => return Ok(stream.write(buf)?),
            Backend::Tls(engine) => engine,
        };
        if buf.is_empty() {
            return Ok(0);
        }
        let result = transfer(engine, &self.retry, Operation::Write, |engine| engine.send(buf));
        if result.is_err() {
            engine.abandon_send();
        }
        result
    }

    /// Decrypted bytes that can be read without blocking.
    pub fn ready(&mut self) -> usize {
        match &mut self.backend {
            Backend::Plaintext(_) => 0,
            Backend::Tls(engine) => engine.pending(),
        }
    }

    /// End the session and give back the stream.
    ///
    /// A TLS session first sends a close notification (best effort). The
    /// stream itself is not closed.
    pub fn teardown(self) -> S {
        match self.backend {
            Backend::Plaintext(stream) => stream,
            Backend::Tls(mut engine) => {
                if let Err(err) = engine.close_notify() {
                    tracing::debug!(error = %err, "close notification not delivered");
                }
                tracing::debug!(mode = %self.mode, "TLS session closed");
                engine.into_stream()
            }
        }
    }

    pub fn get_ref(&self) -> &S {
        match &self.backend {
            Backend::Plaintext(stream) => stream,
            Backend::Tls(engine) => engine.get_ref(),
        }
    }

    /// Direct access to the stream. Reading or writing it on a TLS session
    /// corrupts the channel.
    pub fn get_mut(&mut self) -> &mut S {
        match &mut self.backend {
            Backend::Plaintext(stream) => stream,
            Backend::Tls(engine) => engine.get_mut(),
        }
    }
}

fn transport_error(op: Operation, err: EngineError) -> TransportError {
    match err {
        EngineError::Protocol(err) => TransportError::Protocol {
            op,
            reason: err.to_string(),
        },
        EngineError::Pull(source) | EngineError::Push(source) => TransportError::Io { op, source },
        EngineError::CertificateLookup => TransportError::CertificateLookup(op),
        other => TransportError::Protocol {
            op,
            reason: other.to_string(),
        },
    }
}

/// Run `step` until it makes progress, retrying transient conditions and
/// completing any rehandshake the peer starts.
fn transfer<E, F>(engine: &mut E, policy: &RetryPolicy, op: Operation, mut step: F) -> Result<usize>
where
    E: TlsEngine,
    F: FnMut(&mut E) -> std::result::Result<usize, EngineError>,
{
    let mut failures = 0u32;
    loop {
        match step(engine) {
            Ok(n) => return Ok(n),
            Err(EngineError::ZeroReturn) => {
                tracing::debug!(%op, "peer closed the secure channel");
                return Ok(0);
            }
            Err(EngineError::Rehandshake) => {
                tracing::debug!(%op, "completing rehandshake");
                handshake::complete(engine, policy).map_err(TransportError::Rehandshake)?;
            }
            Err(err) if err.is_transient() => {
                tracing::trace!(%op, attempt = failures + 1, condition = %err, "would block");
            }
            Err(err) => {
                tracing::warn!(%op, error = %err, "TLS transfer failed");
                return Err(transport_error(op, err).into());
            }
        }
        failures += 1;
        if !policy.pause(failures) {
            tracing::warn!(%op, attempts = failures, "retries exhausted");
            return Err(TransportError::RetriesExhausted {
                op,
                attempts: failures,
            }
            .into());
        }
    }
}

impl<S, E> Read for Session<S, E>
where
    S: Read + Write,
    E: TlsEngine<Stream = S>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Session::read(self, buf).map_err(into_io)
    }
}

impl<S, E> Write for Session<S, E>
where
    S: Read + Write,
    E: TlsEngine<Stream = S>,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Session::write(self, buf).map_err(into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backend {
            Backend::Plaintext(stream) => stream.flush(),
            // records are flushed by every write
            Backend::Tls(_) => Ok(()),
        }
    }
}

fn into_io(err: Error) -> io::Error {
    match err {
        Error::Io(err) => err,
        Error::Transport(TransportError::Io { source, .. }) => source,
        other => io::Error::other(other),
    }
}
