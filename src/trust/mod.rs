//! Trust posture and TLS client configuration.

pub mod verifier;

use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};

use crate::error::ConfigError;
use crate::session::SessionConfig;

use self::verifier::{AnchoredVerifier, DisabledVerifier};

/// How a session protects its byte stream. Fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// No TLS; reads and writes go straight to the socket.
    Plaintext,
    /// TLS with the peer chain verified against a trust anchor bundle.
    Verified,
    /// TLS without peer verification: encrypted, not authenticated.
    Unverified,
}

impl TlsMode {
    pub fn select(trust_anchor: Option<&Path>, allow_untrusted: bool) -> Self {
        match (trust_anchor, allow_untrusted) {
            (_, true) => Self::Unverified,
            (Some(_), false) => Self::Verified,
            (None, false) => Self::Plaintext,
        }
    }

    pub fn is_tls(self) -> bool {
        self != Self::Plaintext
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plaintext => "plaintext",
            Self::Verified => "verified",
            Self::Unverified => "unverified",
        })
    }
}

/// Oldest TLS version a session will negotiate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MinProtocolVersion {
    #[default]
    Tls12,
    Tls13,
}

impl MinProtocolVersion {
    fn versions(self) -> &'static [&'static SupportedProtocolVersion] {
        static BOTH: &[&SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
        match self {
            Self::Tls12 => BOTH,
            Self::Tls13 => TLS13_ONLY,
        }
    }
}

/// The process-wide crypto provider, created on first use and shared by
/// every session configuration.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    static INSTANCE: OnceLock<Arc<CryptoProvider>> = OnceLock::new();
    INSTANCE
        .get_or_init(|| Arc::new(rustls::crypto::ring::default_provider()))
        .clone()
}

/// Load every certificate of a PEM bundle into a root store.
pub fn load_trust_anchors(path: &Path) -> Result<RootCertStore, ConfigError> {
    let pem = fs::read(path).map_err(|source| ConfigError::TrustAnchorRead {
        path: path.to_owned(),
        source,
    })?;

    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::TrustAnchorParse {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(ConfigError::NoTrustAnchors {
            path: path.to_owned(),
        });
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots.add(cert).map_err(|e| ConfigError::TrustAnchorParse {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
    }
    tracing::debug!(path = %path.display(), anchors = roots.len(), "loaded trust anchors");
    Ok(roots)
}

/// Name presented for SNI and host-name verification.
///
/// Without a configured name no SNI is sent and only the chain is verified.
pub fn server_name(config: &SessionConfig) -> Result<ServerName<'static>, ConfigError> {
    match config.server_name.as_deref() {
        Some(name) => ServerName::try_from(name.to_owned())
            .map_err(|_| ConfigError::InvalidServerName(name.to_owned())),
        None => Ok(ServerName::IpAddress(IpAddr::V4(Ipv4Addr::UNSPECIFIED).into())),
    }
}

/// Build the client configuration for a TLS session.
///
/// Returns `None` in plaintext mode.
pub fn client_config(config: &SessionConfig) -> Result<Option<Arc<ClientConfig>>, ConfigError> {
    let mode = config.mode();
    if !mode.is_tls() {
        return Ok(None);
    }

    let provider = crypto_provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(config.min_protocol_version.versions())
        .map_err(ConfigError::Engine)?;

    let builder = match (mode, config.trust_anchor.as_deref()) {
        (TlsMode::Verified, Some(path)) => {
            let roots = load_trust_anchors(path)?;
            let webpki =
                WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                    .build()?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AnchoredVerifier::new(
                    webpki,
                    config.verify_depth,
                    config.server_name.is_some(),
                )))
        }
        _ => {
            if config.trust_anchor.is_some() {
                tracing::debug!("verification disabled, ignoring trust anchor bundle");
            }
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(DisabledVerifier::new(
                    provider.signature_verification_algorithms,
                )))
        }
    };

    let mut client = builder.with_no_client_auth();
    client.enable_sni = config.server_name.is_some();
    client.resumption = rustls::client::Resumption::disabled();
    Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn mode_selection() {
        let path = Path::new("/etc/ssl/ca.pem");
        assert_eq!(TlsMode::select(None, false), TlsMode::Plaintext);
        assert_eq!(TlsMode::select(Some(path), false), TlsMode::Verified);
        assert_eq!(TlsMode::select(None, true), TlsMode::Unverified);
        assert_eq!(TlsMode::select(Some(path), true), TlsMode::Unverified);
    }

    #[test]
    fn provider_is_shared() {
        assert!(Arc::ptr_eq(&crypto_provider(), &crypto_provider()));
    }

    #[test]
    fn missing_bundle_is_a_read_error() {
        let err = load_trust_anchors(Path::new("/nonexistent/ca.pem")).unwrap_err();
        assert!(matches!(err, ConfigError::TrustAnchorRead { .. }), "{err}");
    }

    #[test]
    fn bundle_without_certificates_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate\n").unwrap();
        let err = load_trust_anchors(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NoTrustAnchors { .. }), "{err}");
    }

    #[test]
    fn bundle_loads_generated_ca() {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca = params.self_signed(&key).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ca.pem().as_bytes()).unwrap();
        let roots = load_trust_anchors(file.path()).unwrap();
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn plaintext_needs_no_client_config() {
        let config = SessionConfig::default();
        assert!(client_config(&config).unwrap().is_none());
    }

    #[test]
    fn unverified_config_ignores_bad_bundle() {
        let config = SessionConfig::builder()
            .trust_anchor("/nonexistent/ca.pem")
            .allow_untrusted(true)
            .build()
            .unwrap();
        let client = client_config(&config).unwrap().unwrap();
        assert!(!client.enable_sni);
    }

    #[test]
    fn invalid_server_name_is_rejected() {
        let mut config = SessionConfig::default();
        config.server_name = Some("not a host name!".into());
        assert!(matches!(
            server_name(&config),
            Err(ConfigError::InvalidServerName(_))
        ));
    }
}
