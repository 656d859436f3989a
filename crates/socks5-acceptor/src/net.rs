use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};

/// Transport a name is resolved for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Network operations the acceptor relies on to serve a request.
///
/// Implementations are shared across concurrent handshakes. Deadlines, if any, are the
/// implementation's business: the acceptor itself never times out.
#[async_trait]
pub trait Network: Send + Sync {
    async fn resolve(&self, host: &str, port: u16, transport: Transport) -> io::Result<Vec<SocketAddr>>;

    /// Connects to the first reachable candidate.
    async fn connect(&self, candidates: &[SocketAddr]) -> io::Result<TcpStream>;

    async fn bind_udp(&self, local: SocketAddr) -> io::Result<UdpSocket>;
}

/// [`Network`] backed by the tokio runtime and the system resolver.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioNetwork;

#[async_trait]
impl Network for TokioNetwork {
    async fn resolve(&self, host: &str, port: u16, _transport: Transport) -> io::Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.collect())
    }

    async fn connect(&self, candidates: &[SocketAddr]) -> io::Result<TcpStream> {
        let mut last_error = None;

        for candidate in candidates {
            match TcpStream::connect(candidate).await {
                Ok(stream) => return Ok(stream),
                Err(error) => {
                    trace!(%candidate, %error, "Connection attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no candidate address")))
    }

    async fn bind_udp(&self, local: SocketAddr) -> io::Result<UdpSocket> {
        UdpSocket::bind(local).await
    }
}
