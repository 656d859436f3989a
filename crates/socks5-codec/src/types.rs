use core::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Authentication method identifiers (RFC 1928, section 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    /// X'00' NO AUTHENTICATION REQUIRED
    Anonymous,
    /// X'01' GSSAPI
    GssApi,
    /// X'02' USERNAME/PASSWORD
    Password,
    /// X'03' to X'FE', IANA assigned or reserved for private methods.
    Unassigned(u8),
    /// X'FF' NO ACCEPTABLE METHODS
    NoAcceptable,
}

impl AuthMethod {
    pub const fn code(self) -> u8 {
        match self {
            AuthMethod::Anonymous => 0x00,
            AuthMethod::GssApi => 0x01,
            AuthMethod::Password => 0x02,
            AuthMethod::Unassigned(code) => code,
            AuthMethod::NoAcceptable => 0xFF,
        }
    }
}

impl From<u8> for AuthMethod {
    fn from(code: u8) -> Self {
        match code {
            0x00 => AuthMethod::Anonymous,
            0x01 => AuthMethod::GssApi,
            0x02 => AuthMethod::Password,
            0xFF => AuthMethod::NoAcceptable,
            code => AuthMethod::Unassigned(code),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Anonymous => write!(f, "anonymous"),
            AuthMethod::GssApi => write!(f, "GSSAPI"),
            AuthMethod::Password => write!(f, "username/password"),
            AuthMethod::Unassigned(code) => write!(f, "unassigned({code:#04x})"),
            AuthMethod::NoAcceptable => write!(f, "no acceptable methods"),
        }
    }
}

/// ATYP field of the request and reply frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressType {
    #[default]
    Unknown = 0x00,
    Ipv4 = 0x01,
    Domain = 0x03,
    Ipv6 = 0x04,
}

impl AddressType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Unrecognized codes map to [`AddressType::Unknown`].
    pub const fn from_code(code: u8) -> Self {
        match code {
            0x01 => AddressType::Ipv4,
            0x03 => AddressType::Domain,
            0x04 => AddressType::Ipv6,
            _ => AddressType::Unknown,
        }
    }

    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressType::Ipv4,
            SocketAddr::V6(_) => AddressType::Ipv6,
        }
    }
}

/// CMD field of the request frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl Command {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Command::Connect),
            0x02 => Some(Command::Bind),
            0x03 => Some(Command::UdpAssociate),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// REP field of the reply frame, as defined in RFC 1928.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectResult {
    Succeeded = 0x00,
    GeneralSocksServerFailure = 0x01,
    ConnectionNotAllowedByRuleset = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl ConnectResult {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(ConnectResult::Succeeded),
            0x01 => Some(ConnectResult::GeneralSocksServerFailure),
            0x02 => Some(ConnectResult::ConnectionNotAllowedByRuleset),
            0x03 => Some(ConnectResult::NetworkUnreachable),
            0x04 => Some(ConnectResult::HostUnreachable),
            0x05 => Some(ConnectResult::ConnectionRefused),
            0x06 => Some(ConnectResult::TtlExpired),
            0x07 => Some(ConnectResult::CommandNotSupported),
            0x08 => Some(ConnectResult::AddressTypeNotSupported),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectResult::Succeeded => write!(f, "succeeded"),
            ConnectResult::GeneralSocksServerFailure => write!(f, "general SOCKS server failure"),
            ConnectResult::ConnectionNotAllowedByRuleset => write!(f, "connection not allowed by ruleset"),
            ConnectResult::NetworkUnreachable => write!(f, "network unreachable"),
            ConnectResult::HostUnreachable => write!(f, "host unreachable"),
            ConnectResult::ConnectionRefused => write!(f, "connection refused"),
            ConnectResult::TtlExpired => write!(f, "TTL expired"),
            ConnectResult::CommandNotSupported => write!(f, "command not supported"),
            ConnectResult::AddressTypeNotSupported => write!(f, "address type not supported"),
        }
    }
}

/// Classifies an outbound connection failure.
impl From<io::ErrorKind> for ConnectResult {
    fn from(kind: io::ErrorKind) -> ConnectResult {
        match kind {
            io::ErrorKind::ConnectionRefused => ConnectResult::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ConnectResult::NetworkUnreachable,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NotFound => ConnectResult::HostUnreachable,
            _ => ConnectResult::GeneralSocksServerFailure,
        }
    }
}

impl From<&io::Error> for ConnectResult {
    fn from(e: &io::Error) -> ConnectResult {
        ConnectResult::from(e.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl DestAddr {
    pub fn address_type(&self) -> AddressType {
        match self {
            DestAddr::Ip(addr) => AddressType::of(addr),
            DestAddr::Domain(..) => AddressType::Domain,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            DestAddr::Ip(addr) => addr.port(),
            DestAddr::Domain(_, port) => *port,
        }
    }

    /// Textual host part, as carried in the handshake info.
    pub fn host(&self) -> String {
        match self {
            DestAddr::Ip(addr) => addr.ip().to_string(),
            DestAddr::Domain(domain, _) => domain.clone(),
        }
    }

    pub fn as_ip(&self) -> Option<SocketAddr> {
        match self {
            DestAddr::Ip(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn as_domain(&self) -> Option<(&str, u16)> {
        match self {
            DestAddr::Domain(dns, port) => Some((dns, *port)),
            _ => None,
        }
    }
}

impl From<SocketAddr> for DestAddr {
    fn from(addr: SocketAddr) -> Self {
        DestAddr::Ip(addr)
    }
}

impl From<(Ipv4Addr, u16)> for DestAddr {
    fn from((ip, port): (Ipv4Addr, u16)) -> Self {
        DestAddr::Ip(SocketAddr::V4(SocketAddrV4::new(ip, port)))
    }
}

impl From<(Ipv6Addr, u16)> for DestAddr {
    fn from((ip, port): (Ipv6Addr, u16)) -> Self {
        DestAddr::Ip(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)))
    }
}

impl fmt::Display for DestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestAddr::Ip(addr) => write!(f, "{addr}"),
            DestAddr::Domain(domain, port) => write!(f, "{domain}:{port}"),
        }
    }
}
