pub mod channel;
pub mod handshake;
pub mod retry;

use std::path::PathBuf;

use rustls::pki_types::ServerName;

use crate::error::ConfigError;
use crate::trust::{MinProtocolVersion, TlsMode};

use self::retry::RetryPolicy;

/// Default maximum number of intermediate certificates in a peer chain.
pub const DEFAULT_VERIFY_DEPTH: usize = 5;

/// Configuration for a secure session.
///
/// The default configuration selects plaintext mode: no trust anchor and
/// verification not bypassed.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// PEM bundle of trust anchors. Consumed only at initialization.
    pub trust_anchor: Option<PathBuf>,

    /// Skip peer verification (encrypted but unauthenticated).
    pub allow_untrusted: bool,

    /// Host name for SNI and certificate name checks (default: none, chain
    /// verification only).
    pub server_name: Option<String>,

    /// Maximum intermediate certificates accepted in the peer chain (default: 5).
    pub verify_depth: usize,

    /// Oldest protocol version offered (default: TLS 1.2).
    pub min_protocol_version: MinProtocolVersion,

    /// Bound and pacing for transient-condition retries.
    pub retry_policy: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trust_anchor: None,
            allow_untrusted: false,
            server_name: None,
            verify_depth: DEFAULT_VERIFY_DEPTH,
            min_protocol_version: MinProtocolVersion::default(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Create a builder for constructing a `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn mode(&self) -> TlsMode {
        TlsMode::select(self.trust_anchor.as_deref(), self.allow_untrusted)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn trust_anchor(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.trust_anchor = Some(path.into());
        self
    }

    pub fn allow_untrusted(mut self, allow: bool) -> Self {
        self.config.allow_untrusted = allow;
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = Some(name.into());
        self
    }

    pub fn verify_depth(mut self, depth: usize) -> Self {
        self.config.verify_depth = depth;
        self
    }

    pub fn min_protocol_version(mut self, version: MinProtocolVersion) -> Self {
        self.config.min_protocol_version = version;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Build the `SessionConfig`, validating that all values are sensible.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let config = self.config;
        if config.verify_depth == 0 {
            return Err(ConfigError::InvalidSetting("verify_depth must be > 0"));
        }
        config.retry_policy.validate()?;
        if let Some(name) = config.server_name.as_deref() {
            if ServerName::try_from(name).is_err() {
                return Err(ConfigError::InvalidServerName(name.to_owned()));
            }
        }
        Ok(config)
    }
}
