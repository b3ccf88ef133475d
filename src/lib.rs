//! Blocking client transport over a connected socket.
//!
//! A [`Session`] wraps a stream in one of three postures, chosen once at
//! initialization: plaintext passthrough, TLS verified against a trust
//! anchor bundle, or TLS without peer verification. Reads and writes block
//! until they make progress; transient engine conditions are retried under a
//! bounded [`RetryPolicy`].

pub mod engine;
pub mod error;
pub mod session;
pub mod transport;
pub mod trust;

// Re-export key types at crate root for convenience.
pub use engine::{EngineError, HandshakeSummary, TlsEngine};
pub use error::{ConfigError, Error, HandshakeError, InitError, Operation, Result, TransportError};
pub use session::channel::Session;
pub use session::retry::RetryPolicy;
pub use session::SessionConfig;
pub use trust::{MinProtocolVersion, TlsMode};

#[cfg(feature = "mock")]
pub use engine::mock::{MockEngine, MockStats, Step};
