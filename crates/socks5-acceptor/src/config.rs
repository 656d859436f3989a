use core::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use socks5_codec::AuthMethod;

/// Ordered set of authentication methods supported by the server.
///
/// Insertion order is preference order. The protocol allows up to 255 methods but a server
/// never needs more than a handful, so the list is capped at [`MethodList::CAPACITY`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodList(SmallVec<[AuthMethod; MethodList::CAPACITY]>);

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("method list is full (capacity is {})", MethodList::CAPACITY)]
pub struct MethodListFull;

impl MethodList {
    pub const CAPACITY: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a method with the lowest preference so far.
    ///
    /// Pushing a method already present is a no-op. `NoAcceptable` is a sentinel and is never stored.
    pub fn push(&mut self, method: AuthMethod) -> Result<(), MethodListFull> {
        if method == AuthMethod::NoAcceptable || self.0.contains(&method) {
            return Ok(());
        }

        if self.0.len() == Self::CAPACITY {
            return Err(MethodListFull);
        }

        self.0.push(method);

        Ok(())
    }

    pub fn contains(&self, method: AuthMethod) -> bool {
        self.0.contains(&method)
    }

    pub fn iter(&self) -> impl Iterator<Item = AuthMethod> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Picks the method to use for a client offer.
    ///
    /// Server preference wins: the first supported method that the client also offered is
    /// selected. Returns [`AuthMethod::NoAcceptable`] when there is no intersection.
    pub fn select(&self, offered: &[AuthMethod]) -> AuthMethod {
        self.iter()
            .find(|supported| offered.contains(supported))
            .unwrap_or(AuthMethod::NoAcceptable)
    }
}

impl TryFrom<&[AuthMethod]> for MethodList {
    type Error = MethodListFull;

    fn try_from(methods: &[AuthMethod]) -> Result<Self, Self::Error> {
        let mut list = MethodList::new();
        for method in methods {
            list.push(*method)?;
        }
        Ok(list)
    }
}

/// Username and password received during the RFC 1929 sub-negotiation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Decides whether a username/password pair is accepted.
///
/// Shared by all the handshakes running concurrently, hence `Send + Sync`.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> bool;
}

impl<F> Authenticator for F
where
    F: Fn(&Credentials) -> bool + Send + Sync,
{
    fn authenticate(&self, credentials: &Credentials) -> bool {
        (self)(credentials)
    }
}

/// Fixed table of (username, password) pairs.
#[derive(Clone, Default)]
pub struct StaticUsers {
    users: Vec<(String, String)>,
}

impl StaticUsers {
    pub fn new(users: Vec<(String, String)>) -> Self {
        Self { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl fmt::Debug for StaticUsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.users.iter().map(|(user, _)| user)).finish()
    }
}

impl Authenticator for StaticUsers {
    fn authenticate(&self, credentials: &Credentials) -> bool {
        self.users
            .iter()
            .any(|(usr, pwd)| usr.eq(&credentials.username) && pwd.eq(&credentials.password))
    }
}

/// Address family used for a UDP ASSOCIATE relay socket when the requested domain name can't be resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UdpBindFallback {
    /// Same family as the local endpoint of the TCP control connection.
    #[default]
    ControlConnection,
    Ipv4,
    Ipv6,
}

/// Immutable acceptor configuration, shared read-only by every handshake.
#[derive(Clone)]
pub struct AuthConfig {
    pub supported_methods: MethodList,
    pub authenticator: Arc<dyn Authenticator>,
    pub udp_bind_fallback: UdpBindFallback,
}

impl AuthConfig {
    /// Configuration accepting unauthenticated clients only.
    pub fn anonymous() -> Self {
        let mut supported_methods = MethodList::new();
        supported_methods.push(AuthMethod::Anonymous).expect("empty list has room");

        Self {
            supported_methods,
            authenticator: Arc::new(|_: &Credentials| false),
            udp_bind_fallback: UdpBindFallback::default(),
        }
    }

    /// Configuration requiring username/password authentication.
    pub fn password(authenticator: impl Authenticator + 'static) -> Self {
        let mut supported_methods = MethodList::new();
        supported_methods.push(AuthMethod::Password).expect("empty list has room");

        Self {
            supported_methods,
            authenticator: Arc::new(authenticator),
            udp_bind_fallback: UdpBindFallback::default(),
        }
    }

    #[must_use]
    pub fn with_udp_bind_fallback(mut self, fallback: UdpBindFallback) -> Self {
        self.udp_bind_fallback = fallback;
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("supported_methods", &self.supported_methods)
            .field("udp_bind_fallback", &self.udp_bind_fallback)
            .finish_non_exhaustive()
    }
}
