//! Small shared helper for opening outbound connections with a bounded
//! timeout, used by both the membership and transport client
//! operations.

use crate::registry::PeerAddress;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default per-operation timeout, used for GET_PEERS and reused elsewhere
/// as a sane bound on any single blocking socket call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn connect(peer: &PeerAddress, timeout: Duration) -> io::Result<TcpStream> {
    let addr = resolve(peer)?;
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

fn resolve(peer: &PeerAddress) -> io::Result<SocketAddr> {
    (peer.host.as_str(), peer.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"))
}
