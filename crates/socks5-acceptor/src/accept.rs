use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socks5_codec::{
    AUTH_STATUS_FAILURE, AUTH_STATUS_SUCCESS, AddressType, AuthMethod, CodecError, Command, ConnectResult,
    MethodRequest, RequestHeader, UserPassRequest, decode_address, decode_method_request,
    decode_method_request_header, decode_password_len, decode_request_header, decode_userpass,
    decode_userpass_header, encode_method_reply, encode_reply, encode_userpass_reply,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::config::{AuthConfig, Credentials, UdpBindFallback};
use crate::error::HandshakeError;
use crate::info::{BoundSocket, HandshakeInfo};
use crate::net::{Network, Transport};
use crate::ControlStream;

/// Largest frame of the handshake: a request carrying a 255-byte domain name.
const MAX_FRAME_LEN: usize = RequestHeader::LEN + 255 + 2;

/// Result of a handshake, along with everything learned about the client.
///
/// On success, `info.bound_socket` holds the downstream socket and the caller becomes its sole owner.
#[derive(Debug)]
pub struct HandshakeOutcome {
    pub result: Result<(), HandshakeError>,
    pub info: HandshakeInfo,
}

impl HandshakeOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok() && self.info.bound_socket.is_some()
    }

    pub fn into_result(self) -> Result<HandshakeInfo, HandshakeError> {
        let Self { result, info } = self;
        result.map(|()| info)
    }
}

/// Performs the server side of the SOCKS5 handshake on `stream`.
///
/// Reads the method selection, runs the username/password sub-negotiation when selected,
/// serves the request using `network` and sends the final reply. The control stream is left
/// open in any case: closing it is up to the caller.
pub async fn accept<S>(stream: &mut S, config: &AuthConfig, network: &dyn Network) -> HandshakeOutcome
where
    S: ControlStream,
{
    accept_impl(stream, config, network, &CancellationToken::new()).await
}

/// Same as [`accept`], but aborts at the next suspension point once `cancel` is triggered.
///
/// A cancelled handshake returns [`HandshakeError::Cancelled`] and never holds a bound socket.
pub async fn accept_with_cancellation<S>(
    stream: &mut S,
    config: &AuthConfig,
    network: &dyn Network,
    cancel: &CancellationToken,
) -> HandshakeOutcome
where
    S: ControlStream,
{
    accept_impl(stream, config, network, cancel).await
}

#[instrument(skip_all, fields(client = tracing::field::Empty))]
async fn accept_impl(
    stream: &mut dyn ControlStream,
    config: &AuthConfig,
    network: &dyn Network,
    cancel: &CancellationToken,
) -> HandshakeOutcome {
    let client_endpoint = stream.peer_addr().ok();

    if let Some(client_endpoint) = client_endpoint {
        tracing::Span::current().record("client", tracing::field::display(client_endpoint));
    }

    let mut handshake = Handshake {
        stream,
        config,
        network,
        cancel,
        buf: Vec::with_capacity(MAX_FRAME_LEN),
        info: HandshakeInfo {
            client_endpoint,
            ..HandshakeInfo::default()
        },
    };

    let result = handshake.run().await;

    let mut info = handshake.info;

    match &result {
        Ok(()) => debug!(
            command = ?info.command,
            dest = %info.dest_address,
            port = info.dest_port,
            "SOCKS5 handshake succeeded"
        ),
        Err(error) => {
            info.bound_socket = None;
            debug!(%error, kind = ?error.kind(), "SOCKS5 handshake failed");
        }
    }

    HandshakeOutcome { result, info }
}

struct Handshake<'a> {
    stream: &'a mut dyn ControlStream,
    config: &'a AuthConfig,
    network: &'a dyn Network,
    cancel: &'a CancellationToken,
    buf: Vec<u8>,
    info: HandshakeInfo,
}

/// Outcome of the command dispatch, turned into the final reply.
struct Dispatched {
    result: ConnectResult,
    error: Option<HandshakeError>,
    socket: Option<BoundSocket>,
    /// Replaces the port of the control connection in the reply.
    bound_port: Option<u16>,
}

impl Dispatched {
    fn success(socket: BoundSocket, bound_port: Option<u16>) -> Self {
        Self {
            result: ConnectResult::Succeeded,
            error: None,
            socket: Some(socket),
            bound_port,
        }
    }

    fn failure(result: ConnectResult, error: HandshakeError) -> Self {
        Self {
            result,
            error: Some(error),
            socket: None,
            bound_port: None,
        }
    }
}

impl Handshake<'_> {
    async fn run(&mut self) -> Result<(), HandshakeError> {
        let method = self.negotiate_method().await?;

        if method == AuthMethod::Password {
            self.authenticate().await?;
        }

        let header = self.read_request().await?;

        let control_local = self
            .stream
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));

        let dispatched = if self.info.dest_address.is_empty() || self.info.dest_port == 0 {
            trace!("Empty destination address or port");
            Dispatched::failure(ConnectResult::HostUnreachable, HandshakeError::HostUnreachable)
        } else {
            match header.command {
                Some(Command::Connect) => self.connect().await?,
                Some(Command::UdpAssociate) => self.udp_associate(control_local).await?,
                Some(Command::Bind) | None => Dispatched::failure(
                    ConnectResult::CommandNotSupported,
                    HandshakeError::CommandNotSupported(header.command_code),
                ),
            }
        };

        debug!(
            command = header.command_code,
            dest = %self.info.dest_address,
            port = self.info.dest_port,
            result = %dispatched.result,
            "Request dispatched"
        );

        let mut bound = control_local;
        if let Some(port) = dispatched.bound_port {
            bound.set_port(port);
        }

        // The socket is dropped along with `dispatched` if the reply can't be sent.
        self.write_frame(&encode_reply(dispatched.result, bound)).await?;

        match dispatched.error {
            Some(error) => Err(error),
            None => {
                self.info.bound_socket = dispatched.socket;
                Ok(())
            }
        }
    }

    async fn negotiate_method(&mut self) -> Result<AuthMethod, HandshakeError> {
        self.buf.clear();

        self.read_frame_part(MethodRequest::HEADER_LEN).await?;
        let nmethods = decode_method_request_header(&self.buf)?;

        self.read_frame_part(nmethods).await?;
        let request = decode_method_request(&self.buf)?;

        let method = self.config.supported_methods.select(&request.methods);
        trace!(offered = ?request.methods, selected = %method, "Method negotiation");

        self.info.method = Some(method);

        self.write_frame(&encode_method_reply(method)).await?;

        if method == AuthMethod::NoAcceptable {
            return Err(CodecError::NoAcceptableMethods.into());
        }

        Ok(method)
    }

    async fn authenticate(&mut self) -> Result<(), HandshakeError> {
        self.buf.clear();

        self.read_frame_part(UserPassRequest::HEADER_LEN).await?;
        let ulen = decode_userpass_header(&self.buf)?;

        // UNAME and PLEN
        self.read_frame_part(ulen + 1).await?;
        let plen = decode_password_len(self.buf[UserPassRequest::HEADER_LEN + ulen])?;

        self.read_frame_part(plen).await?;
        let request = decode_userpass(&self.buf)?;

        let credentials = Credentials {
            username: request.username,
            password: request.password,
        };

        let accepted = self.config.authenticator.authenticate(&credentials);
        trace!(username = %credentials.username, accepted, "Password authentication");

        self.info.credentials = Some(credentials);

        if !accepted {
            match self.write_frame(&encode_userpass_reply(AUTH_STATUS_FAILURE)).await {
                Ok(()) => {}
                Err(HandshakeError::Cancelled) => return Err(HandshakeError::Cancelled),
                Err(error) => debug!(%error, "Failed to send authentication failure reply"),
            }

            return Err(CodecError::AuthenticationFailed.into());
        }

        self.write_frame(&encode_userpass_reply(AUTH_STATUS_SUCCESS)).await
    }

    async fn read_request(&mut self) -> Result<RequestHeader, HandshakeError> {
        self.buf.clear();

        self.read_frame_part(RequestHeader::LEN).await?;
        let header = decode_request_header(&self.buf)?;

        self.info.command = header.command;
        self.info.address_type = header.address_type;

        self.read_frame_part(header.remaining_len()).await?;
        let (dest_address, dest_port) =
            decode_address(header.address_type, &self.buf[RequestHeader::LEN..], header.first_byte)?;

        self.info.dest_address = dest_address;
        self.info.dest_port = dest_port;

        Ok(header)
    }

    async fn connect(&mut self) -> Result<Dispatched, HandshakeError> {
        let resolved = guarded(
            self.cancel,
            self.network
                .resolve(&self.info.dest_address, self.info.dest_port, Transport::Tcp),
        )
        .await?;

        let candidates = match resolved {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => {
                let error = io::Error::new(io::ErrorKind::NotFound, "host not found");
                return Ok(Dispatched::failure(
                    ConnectResult::HostUnreachable,
                    HandshakeError::Resolve(error),
                ));
            }
            Err(error) => {
                return Ok(Dispatched::failure(
                    ConnectResult::HostUnreachable,
                    HandshakeError::Resolve(error),
                ));
            }
        };

        match guarded(self.cancel, self.network.connect(&candidates)).await? {
            Ok(stream) => {
                trace!(peer = ?stream.peer_addr().ok(), "Connected to destination");
                Ok(Dispatched::success(BoundSocket::Tcp(stream), None))
            }
            Err(error) => Ok(Dispatched::failure(
                ConnectResult::from(&error),
                HandshakeError::Connect(error),
            )),
        }
    }

    async fn udp_associate(&mut self, control_local: SocketAddr) -> Result<Dispatched, HandshakeError> {
        let family = match self.info.address_type {
            AddressType::Ipv6 => Family::V6,
            AddressType::Domain => {
                let resolved = guarded(
                    self.cancel,
                    self.network
                        .resolve(&self.info.dest_address, self.info.dest_port, Transport::Udp),
                )
                .await?;

                match resolved.as_deref() {
                    Ok([first, ..]) => Family::of(first.ip()),
                    Ok([]) => self.fallback_family(control_local),
                    Err(error) => {
                        trace!(%error, "Failed to resolve UDP destination, using fallback family");
                        self.fallback_family(control_local)
                    }
                }
            }
            AddressType::Ipv4 | AddressType::Unknown => Family::V4,
        };

        // Port 0: let the OS pick the relay port.
        let local = SocketAddr::new(family.unspecified(), 0);

        let bound = guarded(self.cancel, self.network.bind_udp(local)).await?;

        let dispatched = match bound.and_then(|socket| {
            let relay_addr = socket.local_addr()?;
            Ok((socket, relay_addr))
        }) {
            Ok((socket, relay_addr)) => {
                trace!(%relay_addr, "UDP relay socket bound");
                Dispatched::success(BoundSocket::Udp(socket), Some(relay_addr.port()))
            }
            Err(error) => Dispatched::failure(ConnectResult::GeneralSocksServerFailure, HandshakeError::Bind(error)),
        };

        Ok(dispatched)
    }

    fn fallback_family(&self, control_local: SocketAddr) -> Family {
        match self.config.udp_bind_fallback {
            UdpBindFallback::ControlConnection => Family::of(control_local.ip()),
            UdpBindFallback::Ipv4 => Family::V4,
            UdpBindFallback::Ipv6 => Family::V6,
        }
    }

    /// Reads exactly `len` more bytes at the end of the frame buffer.
    async fn read_frame_part(&mut self, len: usize) -> Result<(), HandshakeError> {
        let start = self.buf.len();
        self.buf.resize(start + len, 0);

        let stream = &mut *self.stream;
        let buf = &mut self.buf[start..];
        guarded(self.cancel, stream.read_exact(buf)).await??;

        Ok(())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), HandshakeError> {
        let stream = &mut *self.stream;

        guarded(self.cancel, async move {
            stream.write_all(frame).await?;
            stream.flush().await
        })
        .await??;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    fn unspecified(self) -> IpAddr {
        match self {
            Family::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

/// Races `fut` against cancellation.
///
/// Dropping `fut` on cancellation also drops whatever socket it was establishing.
async fn guarded<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, HandshakeError>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(HandshakeError::Cancelled),
        output = fut => Ok(output),
    }
}
