use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UdpSocket};

use crate::ControlStream;
use crate::net::{Network, Transport};

pub(crate) const LOCAL_V4: &str = "10.0.0.1:1080";
pub(crate) const LOCAL_V6: &str = "[2001:db8::1]:1080";
pub(crate) const PEER: &str = "192.0.2.7:50000";

/// Control stream with fixed endpoints around any byte stream.
#[derive(Debug)]
pub(crate) struct TestStream<S> {
    inner: S,
    local: SocketAddr,
    peer: SocketAddr,
}

impl<S> TestStream<S> {
    pub(crate) fn new(inner: S, local: &str) -> Self {
        Self {
            inner,
            local: local.parse().expect("valid local address"),
            peer: PEER.parse().expect("valid peer address"),
        }
    }
}

impl<S> ControlStream for TestStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }
}

impl<S> AsyncRead for TestStream<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for TestStream<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Resolve(String, u16, Transport),
    Connect(Vec<SocketAddr>),
    BindUdp(SocketAddr),
}

/// Scripted [`Network`] recording every call.
///
/// Successful connections are real loopback connections to the resolved candidate, and UDP
/// sockets are always bound on 127.0.0.1 whatever the requested family (the requested address is
/// recorded).
#[derive(Debug, Default)]
pub(crate) struct FakeNetwork {
    hosts: HashMap<String, Vec<SocketAddr>>,
    connect_error: Option<io::ErrorKind>,
    bind_error: Option<io::ErrorKind>,
    connect_hangs: bool,
    calls: Mutex<Vec<Call>>,
    udp_bound: Mutex<Vec<SocketAddr>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn with_host(mut self, host: &str, addrs: &[SocketAddr]) -> Self {
        self.hosts.insert(host.to_owned(), addrs.to_vec());
        self
    }

    #[must_use]
    pub(crate) fn with_connect_error(mut self, kind: io::ErrorKind) -> Self {
        self.connect_error = Some(kind);
        self
    }

    #[must_use]
    pub(crate) fn with_bind_error(mut self, kind: io::ErrorKind) -> Self {
        self.bind_error = Some(kind);
        self
    }

    #[must_use]
    pub(crate) fn with_hanging_connect(mut self) -> Self {
        self.connect_hangs = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("poisoned").clone()
    }

    /// Local addresses of the UDP sockets handed out so far.
    pub(crate) fn udp_bound(&self) -> Vec<SocketAddr> {
        self.udp_bound.lock().expect("poisoned").clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("poisoned").push(call);
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn resolve(&self, host: &str, port: u16, transport: Transport) -> io::Result<Vec<SocketAddr>> {
        self.record(Call::Resolve(host.to_owned(), port, transport));

        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::other(format!("failed to lookup address information: {host}")))
    }

    async fn connect(&self, candidates: &[SocketAddr]) -> io::Result<TcpStream> {
        self.record(Call::Connect(candidates.to_vec()));

        if self.connect_hangs {
            std::future::pending::<()>().await;
        }

        if let Some(kind) = self.connect_error {
            return Err(io::Error::from(kind));
        }

        TcpStream::connect(candidates[0]).await
    }

    async fn bind_udp(&self, local: SocketAddr) -> io::Result<UdpSocket> {
        self.record(Call::BindUdp(local));

        if let Some(kind) = self.bind_error {
            return Err(io::Error::from(kind));
        }

        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        self.udp_bound.lock().expect("poisoned").push(socket.local_addr()?);

        Ok(socket)
    }
}
