use std::io::{self, BufRead, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use secure_fd_transport::{Session, SessionConfig};

/// Line echo client over plaintext, verified TLS or unverified TLS.
///
/// Run with: `cargo run --example tls_echo -- 127.0.0.1:9876 --ca ca.pem`
#[derive(Parser, Debug)]
struct Args {
    /// Address of the echo server.
    addr: SocketAddr,

    /// PEM bundle of trust anchors; enables verified TLS.
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Encrypt without verifying the server.
    #[arg(long)]
    insecure: bool,

    /// Host name to present and verify.
    #[arg(long)]
    server_name: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = SessionConfig::builder().allow_untrusted(args.insecure);
    if let Some(ca) = &args.ca {
        builder = builder.trust_anchor(ca);
    }
    if let Some(name) = &args.server_name {
        builder = builder.server_name(name);
    }
    let config = builder.build()?;

    let stream =
        TcpStream::connect(args.addr).with_context(|| format!("connecting to {}", args.addr))?;
    stream.set_nodelay(true)?;
    let mut session = Session::with_config(stream, &config)
        .map_err(anyhow::Error::from)
        .context("session setup failed")?;
    eprintln!("connected to {} ({})", args.addr, session.mode());
    if let Some(summary) = session.handshake_summary() {
        eprintln!(
            "negotiated {:?} {:?}, peer {}",
            summary.protocol_version,
            summary.cipher_suite,
            summary.peer_fingerprint.as_deref().unwrap_or("-")
        );
    }

    let mut stdout = io::stdout().lock();
    for line in io::stdin().lock().lines() {
        let mut line = line?;
        line.push('\n');
        session.write_all(line.as_bytes())?;

        let mut reply = vec![0u8; line.len()];
        let mut filled = 0;
        while filled < reply.len() {
            let n = session.read(&mut reply[filled..])?;
            if n == 0 {
                eprintln!("server closed the connection");
                return Ok(());
            }
            filled += n;
        }
        stdout.write_all(&reply)?;
        stdout.flush()?;
    }

    drop(session.teardown());
    Ok(())
}
