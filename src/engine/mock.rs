use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::{EngineError, HandshakeSummary, TlsEngine};

/// One scripted engine response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Success; for `recv`/`send` the number of bytes transferred.
    Ready(usize),
    WantRead,
    WantWrite,
    Interrupted,
    Rehandshake,
    Closed,
    CertificateLookup,
    Fatal(String),
}

impl Step {
    fn into_result(self) -> Result<usize, EngineError> {
        match self {
            Self::Ready(n) => Ok(n),
            Self::WantRead => Err(EngineError::WantRead),
            Self::WantWrite => Err(EngineError::WantWrite),
            Self::Interrupted => Err(EngineError::Interrupted),
            Self::Rehandshake => Err(EngineError::Rehandshake),
            Self::Closed => Err(EngineError::ZeroReturn),
            Self::CertificateLookup => Err(EngineError::CertificateLookup),
            Self::Fatal(reason) => Err(EngineError::Protocol(rustls::Error::General(reason))),
        }
    }
}

/// Counters shared between a [`MockEngine`] and the test that drives it.
#[derive(Debug, Default)]
pub struct MockStats {
    pub created: AtomicU32,
    pub released: AtomicU32,
    pub handshakes: AtomicU32,
    pub recvs: AtomicU32,
    pub sends: AtomicU32,
    pub abandoned_sends: AtomicU32,
    pub close_notifies: AtomicU32,
}

impl MockStats {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

/// Bumps `released` when the engine state goes away, however that happens.
#[derive(Debug)]
struct Release(Arc<MockStats>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted [`TlsEngine`] for exercising the session state machine.
///
/// Each operation pops the next step from its script. An exhausted script
/// repeats the configured fallback, so `always(Step::WantRead)` models an
/// engine that never makes progress.
///
/// # Security Warning
///
/// Performs no cryptography at all. Enable only via `features = ["mock"]`
/// for testing.
pub struct MockEngine<S = io::Cursor<Vec<u8>>> {
    stream: S,
    handshake_script: VecDeque<Step>,
    recv_script: VecDeque<Step>,
    send_script: VecDeque<Step>,
    fallback: Step,
    fill: u8,
    pending: usize,
    stats: Arc<MockStats>,
    _release: Release,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_stream(io::Cursor::new(Vec::new()))
    }

    /// An engine counting into `stats`, e.g. across a stress loop.
    pub fn sharing(stats: Arc<MockStats>) -> Self {
        Self::with_stats(io::Cursor::new(Vec::new()), stats)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MockEngine<S> {
    pub fn with_stream(stream: S) -> Self {
        Self::with_stats(stream, Arc::new(MockStats::default()))
    }

    pub fn with_stats(stream: S, stats: Arc<MockStats>) -> Self {
        stats.created.fetch_add(1, Ordering::SeqCst);
        Self {
            stream,
            handshake_script: VecDeque::new(),
            recv_script: VecDeque::new(),
            send_script: VecDeque::new(),
            fallback: Step::Ready(0),
            fill: b'x',
            pending: 0,
            _release: Release(Arc::clone(&stats)),
            stats,
        }
    }

    pub fn handshake_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.handshake_script.extend(steps);
        self
    }

    pub fn recv_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.recv_script.extend(steps);
        self
    }

    pub fn send_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.send_script.extend(steps);
        self
    }

    /// Step returned once a script runs dry (default: `Ready(0)`).
    pub fn always(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn pending_bytes(mut self, pending: usize) -> Self {
        self.pending = pending;
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    fn next(script: &mut VecDeque<Step>, fallback: &Step) -> Step {
        script.pop_front().unwrap_or_else(|| fallback.clone())
    }
}

impl<S> TlsEngine for MockEngine<S> {
    type Stream = S;

    fn handshake(&mut self) -> Result<(), EngineError> {
        self.stats.handshakes.fetch_add(1, Ordering::SeqCst);
        // a dry handshake script completes the handshake
        let step = self.handshake_script.pop_front().unwrap_or(Step::Ready(0));
        step.into_result().map(|_| ())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        self.stats.recvs.fetch_add(1, Ordering::SeqCst);
        let n = Self::next(&mut self.recv_script, &self.fallback).into_result()?;
        let n = n.min(buf.len());
        buf[..n].fill(self.fill);
        self.pending = self.pending.saturating_sub(n);
        Ok(n)
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, EngineError> {
        self.stats.sends.fetch_add(1, Ordering::SeqCst);
        let n = Self::next(&mut self.send_script, &self.fallback).into_result()?;
        Ok(n.min(buf.len()))
    }

    fn abandon_send(&mut self) {
        self.stats.abandoned_sends.fetch_add(1, Ordering::SeqCst);
    }

    fn pending(&mut self) -> usize {
        self.pending
    }

    fn close_notify(&mut self) -> Result<(), EngineError> {
        self.stats.close_notifies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn summary(&self) -> Option<HandshakeSummary> {
        Some(HandshakeSummary {
            protocol_version: Some(rustls::ProtocolVersion::TLSv1_3),
            cipher_suite: None,
            peer_fingerprint: None,
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
