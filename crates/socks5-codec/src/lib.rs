//! Encoders and decoders for the SOCKS5 handshake frames.
//!
//! Everything in this crate is synchronous and performs no I/O: callers read exactly the number
//! of bytes a frame requires and hand them over to the matching `decode_*` function.
//!
//! All multi-byte integers are in network byte order.

mod error;
mod frame;
mod types;

pub use error::CodecError;
pub use frame::*;
pub use types::{AddressType, AuthMethod, Command, ConnectResult, DestAddr};
