use std::io::{self, Read, Write};

use rustls::ClientConnection;
use sha2::{Digest, Sha256};

use super::{EngineError, HandshakeSummary, TlsEngine};

/// [`TlsEngine`] backed by a `rustls` client connection.
///
/// The stream's own blocking behavior is kept: on a blocking socket the
/// engine waits inside the socket call, on a non-blocking socket (or one
/// with a timeout) it reports `WantRead`/`WantWrite`.
pub struct RustlsEngine<S> {
    conn: ClientConnection,
    stream: S,
    /// Plaintext accepted by `conn` whose records are not yet on the wire.
    unflushed: Option<usize>,
}

impl<S: Read + Write> RustlsEngine<S> {
    pub fn new(conn: ClientConnection, stream: S) -> Self {
        Self {
            conn,
            stream,
            unflushed: None,
        }
    }

    /// Write every queued TLS record to the stream.
    fn flush_records(&mut self) -> Result<(), EngineError> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.stream) {
                Ok(0) => return Err(EngineError::Push(io::ErrorKind::WriteZero.into())),
                Ok(_) => {}
                Err(err) => return Err(EngineError::from_push(err)),
            }
        }
        self.stream.flush().map_err(EngineError::from_push)
    }

    /// Read one batch of TLS records and process them. Returns the number of
    /// bytes read; zero means the stream reached end of file.
    fn pull_records(&mut self) -> Result<usize, EngineError> {
        let n = self
            .conn
            .read_tls(&mut self.stream)
            .map_err(EngineError::from_pull)?;
        if let Err(err) = self.conn.process_new_packets() {
            // rustls queues an alert describing the failure; deliver it
            let _ = self.flush_records();
            return Err(EngineError::Protocol(err));
        }
        Ok(n)
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> Option<Result<usize, EngineError>> {
        match self.conn.reader().read(buf) {
            Ok(0) => Some(Err(EngineError::ZeroReturn)),
            Ok(n) => Some(Ok(n)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => None,
            Err(err) => Some(Err(EngineError::Pull(err))),
        }
    }
}

impl<S: Read + Write> TlsEngine for RustlsEngine<S> {
    type Stream = S;

    fn handshake(&mut self) -> Result<(), EngineError> {
        while self.conn.is_handshaking() {
            self.flush_records()?;
            if !self.conn.is_handshaking() {
                break;
            }
            if !self.conn.wants_read() {
                return Err(EngineError::WantWrite);
            }
            if self.pull_records()? == 0 {
                return Err(EngineError::Pull(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection during the handshake",
                )));
            }
        }
        self.flush_records()
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.conn.is_handshaking() {
            return Err(EngineError::Rehandshake);
        }
        loop {
            if let Some(result) = self.read_plaintext(buf) {
                return result;
            }
            // post-handshake messages (key updates, tickets) may need a reply
            self.flush_records()?;
            if self.pull_records()? == 0 {
                return match self.read_plaintext(buf) {
                    Some(result) => result,
                    None => Err(EngineError::Pull(io::ErrorKind::UnexpectedEof.into())),
                };
            }
            if self.conn.is_handshaking() {
                return Err(EngineError::Rehandshake);
            }
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, EngineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.conn.is_handshaking() {
            return Err(EngineError::Rehandshake);
        }
        let accepted = match self.unflushed.take() {
            Some(n) => n.min(buf.len()),
            None => self.conn.writer().write(buf).map_err(EngineError::Push)?,
        };
        if accepted == 0 {
            // outgoing buffer is full
            self.flush_records()?;
            return Err(EngineError::WantWrite);
        }
        match self.flush_records() {
            Ok(()) => Ok(accepted),
            Err(err) => {
                if err.is_transient() {
                    self.unflushed = Some(accepted);
                }
                Err(err)
            }
        }
    }

    fn abandon_send(&mut self) {
        self.unflushed = None;
    }

    fn pending(&mut self) -> usize {
        self.conn
            .process_new_packets()
            .map(|state| state.plaintext_bytes_to_read())
            .unwrap_or(0)
    }

    fn close_notify(&mut self) -> Result<(), EngineError> {
        self.conn.send_close_notify();
        self.flush_records()
    }

    fn summary(&self) -> Option<HandshakeSummary> {
        if self.conn.is_handshaking() {
            return None;
        }
        let peer_fingerprint = self
            .conn
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|leaf| hex::encode(Sha256::digest(leaf.as_ref())));
        Some(HandshakeSummary {
            protocol_version: self.conn.protocol_version(),
            cipher_suite: self.conn.negotiated_cipher_suite().map(|s| s.suite()),
            peer_fingerprint,
        })
    }

    fn get_ref(&self) -> &S {
        &self.stream
    }

    fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    fn into_stream(self) -> S {
        self.stream
    }
}
