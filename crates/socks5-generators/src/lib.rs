use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use proptest::array::{uniform4, uniform8};
use proptest::collection::vec;
use proptest::prelude::*;
use socks5_codec::{AuthMethod, Command, DestAddr};

pub fn port() -> impl Strategy<Value = u16> {
    any::<u16>()
}

pub fn nonzero_port() -> impl Strategy<Value = u16> {
    1..=u16::MAX
}

pub fn ipv4_addr() -> impl Strategy<Value = Ipv4Addr> {
    prop_oneof![
        Just(Ipv4Addr::UNSPECIFIED),
        Just(Ipv4Addr::BROADCAST),
        uniform4(any::<u8>()).prop_map(Ipv4Addr::from),
    ]
}

pub fn ipv6_addr() -> impl Strategy<Value = Ipv6Addr> {
    prop_oneof![
        Just(Ipv6Addr::UNSPECIFIED),
        uniform8(any::<u16>()).prop_map(Ipv6Addr::from),
    ]
}

pub fn ip_addr() -> impl Strategy<Value = IpAddr> {
    prop_oneof![ipv4_addr().prop_map(IpAddr::from), ipv6_addr().prop_map(IpAddr::from)]
}

pub fn socket_addr() -> impl Strategy<Value = SocketAddr> {
    (ip_addr(), port()).prop_map(|(ip, port)| SocketAddr::new(ip, port))
}

/// Domain names from 1 to 255 bytes long.
pub fn domain_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,10}\\.[a-z]{1,5}",
        "[a-z0-9.-]{1,255}",
        Just("a".to_owned()),
        Just("a".repeat(255)),
    ]
}

pub fn domain_addr() -> impl Strategy<Value = (String, u16)> {
    (domain_name(), port())
}

pub fn dest_addr() -> impl Strategy<Value = DestAddr> {
    prop_oneof![
        socket_addr().prop_map(DestAddr::Ip),
        domain_addr().prop_map(|(host, port)| DestAddr::Domain(host, port))
    ]
}

pub fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Connect),
        Just(Command::Bind),
        Just(Command::UdpAssociate),
    ]
}

/// Any method a client may offer (0xFF excluded).
pub fn offered_method() -> impl Strategy<Value = AuthMethod> {
    (0..u8::MAX).prop_map(AuthMethod::from)
}

/// Non-empty method offers that never include `excluded`.
pub fn offered_methods_without(excluded: AuthMethod) -> impl Strategy<Value = Vec<AuthMethod>> {
    vec(offered_method().prop_filter("excluded method", move |m| *m != excluded), 1..=255)
}
