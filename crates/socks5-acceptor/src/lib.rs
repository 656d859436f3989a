//! Server side of the SOCKS5 handshake (RFC 1928 and the RFC 1929 username/password sub-negotiation).
//!
//! [`accept`] drives a whole handshake on a control stream and hands back a [`HandshakeOutcome`]:
//! the error, if any, and a [`HandshakeInfo`] holding the downstream socket on success.
//! Relaying data afterwards is up to the caller.

#[macro_use]
extern crate tracing;

mod accept;
mod config;
mod error;
mod info;
mod net;

#[cfg(test)]
mod test_utils;

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub use accept::{HandshakeOutcome, accept, accept_with_cancellation};
pub use config::{AuthConfig, Authenticator, Credentials, MethodList, MethodListFull, StaticUsers, UdpBindFallback};
pub use error::{ErrorKind, HandshakeError};
pub use info::{BoundSocket, HandshakeInfo};
pub use net::{Network, TokioNetwork, Transport};
pub use socks5_codec::{AddressType, AuthMethod, Command, ConnectResult, DestAddr};
pub use tokio_util::sync::CancellationToken;

/// Byte stream the handshake runs on, typically the accepted TCP connection.
///
/// This is a super-trait so that the acceptor can work on a trait object, which avoids
/// duplicating the whole state machine for every stream type.
pub trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl ControlStream for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}
