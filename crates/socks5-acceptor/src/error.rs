use std::io;

use socks5_codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("destination host unreachable")]
    HostUnreachable,

    #[error("command {0:#04x} not supported")]
    CommandNotSupported(u8),

    #[error("failed to resolve destination")]
    Resolve(#[source] io::Error),

    #[error("failed to connect to destination")]
    Connect(#[source] io::Error),

    #[error("failed to bind UDP relay socket")]
    Bind(#[source] io::Error),

    #[error("handshake cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Flat classification of [`HandshakeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedVersion,
    NoAcceptableMethods,
    UnsupportedAuthVersion,
    AuthenticationFailed,
    AddressTypeNotSupported,
    HostUnreachable,
    CommandNotSupported,
    /// Any other malformed frame.
    Malformed,
    /// Pass-through error from the control stream or a downstream operation.
    Transport,
    Cancelled,
}

impl HandshakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandshakeError::Codec(error) => match error {
                CodecError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
                CodecError::NoAcceptableMethods => ErrorKind::NoAcceptableMethods,
                CodecError::UnsupportedAuthVersion(_) => ErrorKind::UnsupportedAuthVersion,
                CodecError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
                CodecError::AddressTypeNotSupported(_) => ErrorKind::AddressTypeNotSupported,
                CodecError::Truncated { .. }
                | CodecError::TrailingBytes(_)
                | CodecError::DomainTooLong(_) => ErrorKind::Malformed,
            },
            HandshakeError::HostUnreachable => ErrorKind::HostUnreachable,
            HandshakeError::CommandNotSupported(_) => ErrorKind::CommandNotSupported,
            HandshakeError::Resolve(_)
            | HandshakeError::Connect(_)
            | HandshakeError::Bind(_)
            | HandshakeError::Io(_) => ErrorKind::Transport,
            HandshakeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Underlying I/O error for pass-through failures.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            HandshakeError::Resolve(error)
            | HandshakeError::Connect(error)
            | HandshakeError::Bind(error)
            | HandshakeError::Io(error) => Some(error),
            _ => None,
        }
    }
}
