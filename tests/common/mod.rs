//! Test PKI and loopback peers.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedProtocolVersion};

use secure_fd_transport::trust::crypto_provider;

/// A certificate authority and a server chain issued under it.
pub struct Pki {
    pub ca_pem: String,
    /// Leaf first, then intermediates (closest to the leaf first).
    pub chain: Vec<CertificateDer<'static>>,
    pub key_der: Vec<u8>,
}

impl Pki {
    /// A leaf for `host` issued directly by a fresh CA.
    pub fn issue(host: &str) -> Self {
        Self::issue_with_intermediates(host, 0)
    }

    /// A leaf for `host` issued through `intermediates` intermediate CAs.
    pub fn issue_with_intermediates(host: &str, intermediates: usize) -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params("test root").self_signed(&ca_key).unwrap();
        let ca_pem = ca.pem();

        let mut issuer = ca;
        let mut issuer_key = ca_key;
        let mut issued = Vec::new();
        for depth in 0..intermediates {
            let key = KeyPair::generate().unwrap();
            let cert = ca_params(&format!("test intermediate {depth}"))
                .signed_by(&key, &issuer, &issuer_key)
                .unwrap();
            issued.push(cert.der().clone());
            issuer = cert;
            issuer_key = key;
        }

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = CertificateParams::new(vec![host.to_string()])
            .unwrap()
            .signed_by(&leaf_key, &issuer, &issuer_key)
            .unwrap();

        let mut chain = vec![leaf.der().clone()];
        chain.extend(issued.into_iter().rev());

        Self {
            ca_pem,
            chain,
            key_der: leaf_key.serialize_der(),
        }
    }

    pub fn write_ca(&self, dir: &Path) -> std::path::PathBuf {
        let path = dir.join("ca.pem");
        std::fs::write(&path, &self.ca_pem).unwrap();
        path
    }

    pub fn server_config(&self, versions: &[&'static SupportedProtocolVersion]) -> Arc<ServerConfig> {
        let key = PrivateKeyDer::try_from(self.key_der.clone()).unwrap();
        let config = ServerConfig::builder_with_provider(crypto_provider())
            .with_protocol_versions(versions)
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(self.chain.clone(), key)
            .unwrap();
        Arc::new(config)
    }
}

fn ca_params(name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CommonName, name);
    params
}

/// What a loopback peer does with each accepted connection.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Echo everything back until the client closes.
    Echo,
    /// Send the payload, then a close notification, then wait for the client.
    SendThenClose(Vec<u8>),
    /// Complete the handshake, then drop the socket without a close
    /// notification.
    Abort,
}

/// A server thread handling `connections` connections in turn.
pub struct Peer {
    pub addr: SocketAddr,
    handle: JoinHandle<Vec<io::Result<Vec<u8>>>>,
}

impl Peer {
    pub fn tls(config: Arc<ServerConfig>, behavior: Behavior, connections: usize) -> Self {
        Self::spawn(connections, move |sock| {
            let conn = rustls::ServerConnection::new(Arc::clone(&config)).map_err(io::Error::other)?;
            let mut tls = rustls::StreamOwned::new(conn, sock);
            match &behavior {
                Behavior::Echo => {
                    let received = echo(&mut tls)?;
                    tls.conn.send_close_notify();
                    let _ = tls.conn.complete_io(&mut tls.sock);
                    Ok(received)
                }
                Behavior::SendThenClose(payload) => {
                    tls.write_all(payload)?;
                    tls.conn.send_close_notify();
                    tls.conn.complete_io(&mut tls.sock)?;
                    let mut rest = Vec::new();
                    let _ = tls.read_to_end(&mut rest);
                    Ok(rest)
                }
                Behavior::Abort => {
                    while tls.conn.is_handshaking() {
                        tls.conn.complete_io(&mut tls.sock)?;
                    }
                    while tls.conn.wants_write() {
                        tls.conn.write_tls(&mut tls.sock)?;
                    }
                    Ok(Vec::new())
                }
            }
        })
    }

    pub fn plain(connections: usize) -> Self {
        Self::spawn(connections, |mut sock| echo(&mut sock))
    }

    fn spawn<F>(connections: usize, mut handle: F) -> Self
    where
        F: FnMut(TcpStream) -> io::Result<Vec<u8>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            (0..connections)
                .map(|_| {
                    let (sock, _) = listener.accept()?;
                    handle(sock)
                })
                .collect()
        });
        Self { addr, handle }
    }

    /// Per-connection results: the bytes received, or the peer's error.
    pub fn join(self) -> Vec<io::Result<Vec<u8>>> {
        self.handle.join().unwrap()
    }
}

/// Connect to a loopback peer the way a caller hands a socket to a session.
pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

/// A stream whose writes report `WouldBlock` while `blocked` is set.
pub struct Gated {
    pub inner: TcpStream,
    pub blocked: Arc<AtomicBool>,
}

impl Gated {
    pub fn new(inner: TcpStream) -> (Self, Arc<AtomicBool>) {
        let blocked = Arc::new(AtomicBool::new(false));
        let gated = Self {
            inner,
            blocked: Arc::clone(&blocked),
        };
        (gated, blocked)
    }
}

impl Read for Gated {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for Gated {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn echo<S: Read + Write>(stream: &mut S) -> io::Result<Vec<u8>> {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(received);
        }
        received.extend_from_slice(&buf[..n]);
        stream.write_all(&buf[..n])?;
        stream.flush()?;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
