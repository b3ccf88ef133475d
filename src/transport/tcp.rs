use std::net::TcpStream;
use std::os::fd::OwnedFd;

/// Take ownership of an already-connected socket descriptor.
///
/// Connecting is left to the caller. The adopted stream has `TCP_NODELAY`
/// set.
pub fn adopt(fd: OwnedFd) -> std::io::Result<TcpStream> {
    let stream = TcpStream::from(fd);
    stream.set_nodelay(true)?;
    Ok(stream)
}
