use std::net::SocketAddr;

use socks5_codec::{AddressType, AuthMethod, Command, DestAddr};
use tokio::net::{TcpStream, UdpSocket};

use crate::config::Credentials;

/// Downstream socket created by a successful command dispatch.
#[derive(Debug)]
pub enum BoundSocket {
    /// Outbound connection established for a CONNECT request.
    Tcp(TcpStream),
    /// Relay socket bound for a UDP ASSOCIATE request.
    Udp(UdpSocket),
}

impl BoundSocket {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            BoundSocket::Tcp(stream) => stream.local_addr(),
            BoundSocket::Udp(socket) => socket.local_addr(),
        }
    }

    pub fn into_tcp(self) -> Option<TcpStream> {
        match self {
            BoundSocket::Tcp(stream) => Some(stream),
            BoundSocket::Udp(_) => None,
        }
    }

    pub fn into_udp(self) -> Option<UdpSocket> {
        match self {
            BoundSocket::Udp(socket) => Some(socket),
            BoundSocket::Tcp(_) => None,
        }
    }
}

/// Everything learned about a client while running its handshake.
///
/// Fields are filled in as the handshake progresses, so on failure only the ones up to the
/// failing step are meaningful.
#[derive(Debug, Default)]
pub struct HandshakeInfo {
    pub client_endpoint: Option<SocketAddr>,
    /// `None` until method negotiation completes.
    pub method: Option<AuthMethod>,
    /// Only set when password authentication was attempted.
    pub credentials: Option<Credentials>,
    /// `None` when no request was read or the CMD byte is unknown.
    pub command: Option<Command>,
    pub address_type: AddressType,
    pub dest_address: String,
    pub dest_port: u16,
    /// Set if and only if the handshake succeeded.
    pub bound_socket: Option<BoundSocket>,
}

impl HandshakeInfo {
    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|credentials| credentials.username.as_str())
    }

    /// Typed destination, once a request has been decoded.
    pub fn dest_addr(&self) -> Option<DestAddr> {
        match self.address_type {
            AddressType::Unknown => None,
            AddressType::Domain => Some(DestAddr::Domain(self.dest_address.clone(), self.dest_port)),
            AddressType::Ipv4 | AddressType::Ipv6 => self
                .dest_address
                .parse()
                .ok()
                .map(|ip| DestAddr::Ip(SocketAddr::new(ip, self.dest_port))),
        }
    }

    pub fn take_bound_socket(&mut self) -> Option<BoundSocket> {
        self.bound_socket.take()
    }
}
