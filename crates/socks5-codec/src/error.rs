#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported SOCKS version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("no acceptable authentication methods")]
    NoAcceptableMethods,

    #[error("unsupported username/password sub-negotiation version {0:#04x}")]
    UnsupportedAuthVersion(u8),

    #[error("username/password authentication failed")]
    AuthenticationFailed,

    #[error("address type {0:#04x} not supported")]
    AddressTypeNotSupported(u8),

    #[error("frame too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("{0} unexpected trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("domain name too long ({0} bytes)")]
    DomainTooLong(usize),
}

pub(crate) fn ensure_len(src: &[u8], expected: usize) -> Result<(), CodecError> {
    if src.len() < expected {
        Err(CodecError::Truncated {
            expected,
            actual: src.len(),
        })
    } else {
        Ok(())
    }
}

pub(crate) fn ensure_exact_len(src: &[u8], expected: usize) -> Result<(), CodecError> {
    ensure_len(src, expected)?;

    if src.len() > expected {
        Err(CodecError::TrailingBytes(src.len() - expected))
    } else {
        Ok(())
    }
}
