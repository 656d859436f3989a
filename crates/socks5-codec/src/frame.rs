use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{CodecError, ensure_exact_len, ensure_len};
use crate::types::{AddressType, AuthMethod, Command, ConnectResult, DestAddr};

pub const SOCKS_VERSION: u8 = 0x05;
pub const PASSWORD_NEGOTIATION_VERSION: u8 = 0x01;

pub const AUTH_STATUS_SUCCESS: u8 = 0x00;
pub const AUTH_STATUS_FAILURE: u8 = 0x01;

const RESERVED: u8 = 0x00;
const PORT_LEN: usize = 2;

// Method selection request (client greeting)
// +----+----------+----------+
// |VER | NMETHODS | METHODS  |
// +----+----------+----------+
// | 1  |    1     | 1 to 255 |
// +----+----------+----------+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRequest {
    pub version: u8,
    pub methods: Vec<AuthMethod>,
}

impl MethodRequest {
    pub const HEADER_LEN: usize = 2;
}

/// Validates the VER and NMETHODS fields and returns the number of method bytes that follow.
pub fn decode_method_request_header(header: &[u8]) -> Result<usize, CodecError> {
    ensure_len(header, MethodRequest::HEADER_LEN)?;

    let version = header[0];
    if version != SOCKS_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let nmethods = header[1];
    if nmethods == 0 {
        return Err(CodecError::NoAcceptableMethods);
    }

    Ok(usize::from(nmethods))
}

pub fn decode_method_request(frame: &[u8]) -> Result<MethodRequest, CodecError> {
    let nmethods = decode_method_request_header(frame)?;
    ensure_exact_len(frame, MethodRequest::HEADER_LEN + nmethods)?;

    let methods = frame[MethodRequest::HEADER_LEN..]
        .iter()
        .copied()
        .map(AuthMethod::from)
        .collect();

    Ok(MethodRequest {
        version: frame[0],
        methods,
    })
}

/// Method selection reply (server choice)
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
pub fn encode_method_reply(method: AuthMethod) -> [u8; 2] {
    [SOCKS_VERSION, method.code()]
}

// https://datatracker.ietf.org/doc/html/rfc1929
// +----+------+----------+------+----------+
// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
// +----+------+----------+------+----------+
// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
// +----+------+----------+------+----------+
#[derive(Clone, PartialEq, Eq)]
pub struct UserPassRequest {
    pub version: u8,
    pub username: String,
    pub password: String,
}

impl UserPassRequest {
    pub const HEADER_LEN: usize = 2;
}

impl core::fmt::Debug for UserPassRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserPassRequest")
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Validates the VER and ULEN fields and returns the username length.
pub fn decode_userpass_header(header: &[u8]) -> Result<usize, CodecError> {
    ensure_len(header, UserPassRequest::HEADER_LEN)?;

    let version = header[0];
    if version != PASSWORD_NEGOTIATION_VERSION {
        return Err(CodecError::UnsupportedAuthVersion(version));
    }

    match header[1] {
        0 => Err(CodecError::AuthenticationFailed),
        ulen => Ok(usize::from(ulen)),
    }
}

/// Validates the PLEN field and returns the password length.
pub fn decode_password_len(plen: u8) -> Result<usize, CodecError> {
    match plen {
        0 => Err(CodecError::AuthenticationFailed),
        plen => Ok(usize::from(plen)),
    }
}

pub fn decode_userpass(frame: &[u8]) -> Result<UserPassRequest, CodecError> {
    let ulen = decode_userpass_header(frame)?;

    let plen_offset = UserPassRequest::HEADER_LEN + ulen;
    ensure_len(frame, plen_offset + 1)?;
    let plen = decode_password_len(frame[plen_offset])?;

    let password_offset = plen_offset + 1;
    ensure_exact_len(frame, password_offset + plen)?;

    let username = lossy_string(&frame[UserPassRequest::HEADER_LEN..plen_offset]);
    let password = lossy_string(&frame[password_offset..]);

    Ok(UserPassRequest {
        version: frame[0],
        username,
        password,
    })
}

/// https://datatracker.ietf.org/doc/html/rfc1929
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
pub fn encode_userpass_reply(status: u8) -> [u8; 2] {
    [PASSWORD_NEGOTIATION_VERSION, status]
}

/// Fixed prefix of a SOCKS request.
///
/// The fifth byte is either the first octet of an IP address or the length of a domain name,
/// depending on `address_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub version: u8,
    /// `None` when the CMD byte is not a known command.
    pub command: Option<Command>,
    pub command_code: u8,
    pub address_type: AddressType,
    pub first_byte: u8,
}

impl RequestHeader {
    pub const LEN: usize = 5;

    /// Number of bytes following the fixed prefix (address remainder and port).
    pub fn remaining_len(&self) -> usize {
        match self.address_type {
            AddressType::Ipv4 => 4 + PORT_LEN - 1,
            AddressType::Domain => usize::from(self.first_byte) + PORT_LEN,
            AddressType::Ipv6 => 16 + PORT_LEN - 1,
            AddressType::Unknown => 0,
        }
    }
}

/// SOCKS request
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub header: RequestHeader,
    pub dest_address: String,
    pub dest_port: u16,
}

pub fn decode_request_header(header: &[u8]) -> Result<RequestHeader, CodecError> {
    ensure_len(header, RequestHeader::LEN)?;

    let version = header[0];
    if version != SOCKS_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let command_code = header[1];

    // RSV (header[2]) is not checked.

    let address_type = match AddressType::from_code(header[3]) {
        AddressType::Unknown => return Err(CodecError::AddressTypeNotSupported(header[3])),
        address_type => address_type,
    };

    Ok(RequestHeader {
        version,
        command: Command::from_code(command_code),
        command_code,
        address_type,
        first_byte: header[4],
    })
}

/// Decodes DST.ADDR and DST.PORT.
///
/// `first_byte` is the byte already consumed as part of the request header and `rest` holds
/// exactly the remaining bytes of the address and the port.
pub fn decode_address(address_type: AddressType, rest: &[u8], first_byte: u8) -> Result<(String, u16), CodecError> {
    let addr_len = match address_type {
        AddressType::Ipv4 => 4 - 1,
        AddressType::Domain => usize::from(first_byte),
        AddressType::Ipv6 => 16 - 1,
        AddressType::Unknown => return Err(CodecError::AddressTypeNotSupported(address_type.code())),
    };

    ensure_exact_len(rest, addr_len + PORT_LEN)?;

    let (addr, port) = rest.split_at(addr_len);
    let port = u16::from_be_bytes([port[0], port[1]]);

    let address = match address_type {
        AddressType::Ipv4 => Ipv4Addr::new(first_byte, addr[0], addr[1], addr[2]).to_string(),
        AddressType::Ipv6 => {
            let mut octets = [0; 16];
            octets[0] = first_byte;
            octets[1..].copy_from_slice(addr);
            Ipv6Addr::from(octets).to_string()
        }
        _ => lossy_string(addr),
    };

    Ok((address, port))
}

pub fn decode_request(frame: &[u8]) -> Result<Request, CodecError> {
    let header = decode_request_header(frame)?;
    let (dest_address, dest_port) = decode_address(header.address_type, &frame[RequestHeader::LEN..], header.first_byte)?;

    Ok(Request {
        header,
        dest_address,
        dest_port,
    })
}

pub fn encode_request(command: Command, dest: &DestAddr, dst: &mut Vec<u8>) -> Result<(), CodecError> {
    dst.extend_from_slice(&[SOCKS_VERSION, command.code(), RESERVED]);
    encode_address(dest, dst)
}

// https://www.ietf.org/rfc/rfc1928.txt
// o  ATYP (1 byte)  address type of following addresses:
//     o  IP V4 address: X'01'
//     o  DOMAINNAME: X'03'
//     o  IP V6 address: X'04'
// o  DST.ADDR (variable)
//      desired destination address
// o  DST.PORT (2 bytes)
//      desired destination port
pub fn encode_address(addr: &DestAddr, dst: &mut Vec<u8>) -> Result<(), CodecError> {
    match addr {
        DestAddr::Ip(addr) => encode_socket_addr(addr, dst),
        DestAddr::Domain(domain, port) => {
            let len = u8::try_from(domain.len()).map_err(|_| CodecError::DomainTooLong(domain.len()))?;
            dst.push(AddressType::Domain.code());
            dst.push(len);
            dst.extend_from_slice(domain.as_bytes());
            dst.extend_from_slice(&port.to_be_bytes());
        }
    }

    Ok(())
}

fn encode_socket_addr(addr: &SocketAddr, dst: &mut Vec<u8>) {
    dst.push(AddressType::of(addr).code());

    match addr.ip() {
        IpAddr::V4(ip) => dst.extend_from_slice(&ip.octets()),
        IpAddr::V6(ip) => dst.extend_from_slice(&ip.octets()),
    }

    dst.extend_from_slice(&addr.port().to_be_bytes());
}

/// SOCKS reply
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | 4 or 16  |    2     |
/// +----+-----+-------+------+----------+----------+
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub rep: u8,
    pub bound: SocketAddr,
}

impl Reply {
    pub const FIXED_PART_LEN: usize = 4;
    pub const MAX_LEN: usize = Self::FIXED_PART_LEN + 16 + PORT_LEN;
}

/// Encodes a reply frame.
///
/// ATYP and BND.ADDR follow the family of `bound`, whatever the address type of the request was.
pub fn encode_reply(result: ConnectResult, bound: SocketAddr) -> Vec<u8> {
    let mut packet = Vec::with_capacity(Reply::MAX_LEN);
    packet.extend_from_slice(&[SOCKS_VERSION, result.code(), RESERVED]);
    encode_socket_addr(&bound, &mut packet);
    packet
}

/// Decodes a reply frame carrying an IP bound address.
pub fn decode_reply(frame: &[u8]) -> Result<Reply, CodecError> {
    ensure_len(frame, Reply::FIXED_PART_LEN)?;

    if frame[0] != SOCKS_VERSION {
        return Err(CodecError::UnsupportedVersion(frame[0]));
    }

    let rep = frame[1];
    let addr = &frame[Reply::FIXED_PART_LEN..];

    let bound = match AddressType::from_code(frame[3]) {
        AddressType::Ipv4 => {
            ensure_exact_len(addr, 4 + PORT_LEN)?;
            let ip = Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]);
            SocketAddr::new(IpAddr::V4(ip), u16::from_be_bytes([addr[4], addr[5]]))
        }
        AddressType::Ipv6 => {
            ensure_exact_len(addr, 16 + PORT_LEN)?;
            let mut octets = [0; 16];
            octets.copy_from_slice(&addr[..16]);
            SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), u16::from_be_bytes([addr[16], addr[17]]))
        }
        _ => return Err(CodecError::AddressTypeNotSupported(frame[3])),
    };

    Ok(Reply { rep, bound })
}

/// Fields are arbitrary octets on the wire: invalid UTF-8 sequences become U+FFFD.
fn lossy_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_request() {
        let request = decode_method_request(&[0x05, 0x02, 0x00, 0x02]).unwrap();
        assert_eq!(request.version, SOCKS_VERSION);
        assert_eq!(request.methods, [AuthMethod::Anonymous, AuthMethod::Password]);
    }

    #[test]
    fn method_request_wrong_version() {
        assert_eq!(
            decode_method_request_header(&[0x04, 0x01]),
            Err(CodecError::UnsupportedVersion(0x04))
        );
    }

    #[test]
    fn method_request_without_methods() {
        assert_eq!(
            decode_method_request(&[0x05, 0x00]),
            Err(CodecError::NoAcceptableMethods)
        );
    }

    #[test]
    fn method_request_truncated() {
        assert_eq!(
            decode_method_request(&[0x05, 0x03, 0x00]),
            Err(CodecError::Truncated { expected: 5, actual: 3 })
        );
    }

    #[test]
    fn method_reply() {
        assert_eq!(encode_method_reply(AuthMethod::Anonymous), [0x05, 0x00]);
        assert_eq!(encode_method_reply(AuthMethod::NoAcceptable), [0x05, 0xFF]);
    }

    #[test]
    fn userpass_request() {
        let request = decode_userpass(b"\x01\x03bob\x03xyz").unwrap();
        assert_eq!(request.username, "bob");
        assert_eq!(request.password, "xyz");
        assert!(!format!("{request:?}").contains("xyz"));
    }

    #[test]
    fn userpass_wrong_version() {
        assert_eq!(
            decode_userpass(b"\x05\x03bob\x03xyz"),
            Err(CodecError::UnsupportedAuthVersion(0x05))
        );
    }

    #[test]
    fn userpass_empty_fields() {
        assert_eq!(decode_userpass(b"\x01\x00\x03xyz"), Err(CodecError::AuthenticationFailed));
        assert_eq!(decode_userpass(b"\x01\x03bob\x00"), Err(CodecError::AuthenticationFailed));
        assert_eq!(decode_password_len(0), Err(CodecError::AuthenticationFailed));
    }

    #[test]
    fn userpass_reply() {
        assert_eq!(encode_userpass_reply(AUTH_STATUS_SUCCESS), [0x01, 0x00]);
        assert_eq!(encode_userpass_reply(AUTH_STATUS_FAILURE), [0x01, 0x01]);
    }

    #[test]
    fn connect_request_ipv4() {
        let request = decode_request(&[0x05, 0x01, 0x00, 0x01, 0x93, 0x84, 0xE8, 0x23, 0x01, 0xBB]).unwrap();
        assert_eq!(request.header.command, Some(Command::Connect));
        assert_eq!(request.header.address_type, AddressType::Ipv4);
        assert_eq!(request.header.remaining_len(), 5);
        assert_eq!(request.dest_address, "147.132.232.35");
        assert_eq!(request.dest_port, 443);
    }

    #[test]
    fn request_domain() {
        let mut frame = vec![0x05, 0x03, 0x00, 0x03, 11];
        frame.extend_from_slice(b"example.com");
        frame.extend_from_slice(&[0x00, 0x35]);

        let request = decode_request(&frame).unwrap();
        assert_eq!(request.header.command, Some(Command::UdpAssociate));
        assert_eq!(request.header.remaining_len(), 13);
        assert_eq!(request.dest_address, "example.com");
        assert_eq!(request.dest_port, 53);
    }

    #[test]
    fn request_empty_domain() {
        let request = decode_request(&[0x05, 0x01, 0x00, 0x03, 0x00, 0x00, 0x50]).unwrap();
        assert_eq!(request.dest_address, "");
        assert_eq!(request.dest_port, 80);
    }

    #[test]
    fn request_ipv6() {
        let mut frame = vec![0x05, 0x01, 0x00, 0x04];
        frame.extend_from_slice(&"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        frame.extend_from_slice(&[0x1F, 0x90]);

        let request = decode_request(&frame).unwrap();
        assert_eq!(request.header.first_byte, 0x20);
        assert_eq!(request.header.remaining_len(), 17);
        assert_eq!(request.dest_address, "2001:db8::1");
        assert_eq!(request.dest_port, 8080);
    }

    #[test]
    fn request_unknown_command_is_not_a_decode_error() {
        let header = decode_request_header(&[0x05, 0x09, 0x00, 0x01, 0x7F]).unwrap();
        assert_eq!(header.command, None);
        assert_eq!(header.command_code, 0x09);
    }

    #[test]
    fn request_unknown_address_type() {
        assert_eq!(
            decode_request_header(&[0x05, 0x01, 0x00, 0x02, 0x00]),
            Err(CodecError::AddressTypeNotSupported(0x02))
        );
        assert_eq!(
            decode_request_header(&[0x04, 0x01, 0x00, 0x01, 0x00]),
            Err(CodecError::UnsupportedVersion(0x04))
        );
    }

    #[test]
    fn non_utf8_domain_is_kept() {
        let (domain, port) = decode_address(AddressType::Domain, &[0xC3, 0x28, 0x00, 0x50], 2).unwrap();
        assert_eq!(domain, "\u{FFFD}(");
        assert_eq!(port, 80);
    }

    #[test]
    fn non_utf8_password_is_kept() {
        let request = decode_userpass(b"\x01\x03bob\x02\xFF\xFE").unwrap();
        assert_eq!(request.username, "bob");
        assert_eq!(request.password, "\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn domain_too_long() {
        let mut buf = Vec::new();
        let addr = DestAddr::Domain("a".repeat(256), 80);
        assert_eq!(encode_address(&addr, &mut buf), Err(CodecError::DomainTooLong(256)));
    }

    #[test]
    fn reply_ipv4() {
        let bound = "10.0.0.1:1080".parse().unwrap();
        let frame = encode_reply(ConnectResult::Succeeded, bound);
        assert_eq!(frame, [0x05, 0x00, 0x00, 0x01, 10, 0, 0, 1, 0x04, 0x38]);
        assert_eq!(decode_reply(&frame).unwrap(), Reply { rep: 0x00, bound });
    }

    #[test]
    fn reply_ipv6_uses_16_bytes() {
        let bound = "[::1]:53".parse().unwrap();
        let frame = encode_reply(ConnectResult::HostUnreachable, bound);
        assert_eq!(frame.len(), Reply::MAX_LEN);
        assert_eq!(&frame[..4], &[0x05, 0x04, 0x00, 0x04]);
        assert_eq!(&frame[20..], &[0x00, 0x35]);
    }
}
