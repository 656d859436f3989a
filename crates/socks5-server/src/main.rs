#[macro_use]
extern crate tracing;

mod config;

use std::env;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use socks5_acceptor::{AuthConfig, BoundSocket, TokioNetwork, accept};
use tokio::io::AsyncReadExt as _;
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument as _;
use tracing_subscriber::EnvFilter;

use crate::config::Conf;

const USAGE: &str = "[--config <PATH>] [--bind <ADDR>] [--port <PORT>] [--no-auth-required] \
[--user <USERNAME>,<PASSWORD>]... [--handshake-timeout <SECS>] [--log-filter <DIRECTIVES>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let args: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();
    let args = parse_args(&args)?;

    if args.show_usage {
        print_usage();
        return Ok(());
    }

    let conf = Conf::load(&args)?;

    init_logging(&conf.log_filter)?;

    debug!(?conf, "Configuration loaded");

    let listener = TcpListener::bind(conf.listener)
        .await
        .with_context(|| format!("failed to bind listener on {}", conf.listener))?;

    info!(addr = %conf.listener, "Listening for SOCKS5 clients");

    let auth = Arc::new(conf.auth);
    let handshake_timeout = conf.handshake_timeout;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        warn!(%error, "Failed to accept connection");
                        continue;
                    }
                };

                let auth = Arc::clone(&auth);

                tokio::spawn(
                    async move {
                        match process_socket(socket, &auth, handshake_timeout).await {
                            Ok(()) => debug!("Connection closed"),
                            Err(error) => warn!(error = format!("{error:#}"), "Connection failed"),
                        }
                    }
                    .instrument(info_span!("client", %addr)),
                );
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_usage() {
    let prgm_name = env::args().next().unwrap_or_else(|| "socks5-server".to_owned());
    println!("Usage: {prgm_name} {USAGE}");
}

fn init_logging(log_filter: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_new(log_filter).context("invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install tracing subscriber")
}

#[derive(Debug, Default)]
struct Args<'a> {
    config: Option<&'a str>,
    bind: Option<IpAddr>,
    port: Option<u16>,
    no_auth_required: bool,
    users: Vec<(&'a str, &'a str)>,
    handshake_timeout: Option<u64>,
    log_filter: Option<&'a str>,
    show_usage: bool,
}

fn parse_args<'a>(mut input: &[&'a str]) -> anyhow::Result<Args<'a>> {
    let mut args = Args::default();

    loop {
        match input {
            ["--config" | "-c", value, rest @ ..] => {
                args.config = Some(*value);
                input = rest;
            }
            ["--bind" | "-b", value, rest @ ..] => {
                args.bind = Some(value.parse().with_context(|| format!("bind address malformed: {value}"))?);
                input = rest;
            }
            ["--port" | "-p", value, rest @ ..] => {
                args.port = Some(value.parse().with_context(|| format!("port value malformed: {value}"))?);
                input = rest;
            }
            ["--no-auth-required", rest @ ..] => {
                args.no_auth_required = true;
                input = rest;
            }
            ["--user" | "-u", value, rest @ ..] => {
                let (user, pass) = value
                    .split_once(',')
                    .with_context(|| format!("malformed username,password: {value}"))?;
                args.users.push((user, pass));
                input = rest;
            }
            ["--handshake-timeout", value, rest @ ..] => {
                args.handshake_timeout = Some(
                    value
                        .parse()
                        .with_context(|| format!("handshake timeout malformed: {value}"))?,
                );
                input = rest;
            }
            ["--log-filter", value, rest @ ..] => {
                args.log_filter = Some(*value);
                input = rest;
            }
            ["--help" | "-h", rest @ ..] => {
                args.show_usage = true;
                input = rest;
            }
            [unexpected_arg, ..] => anyhow::bail!("unexpected argument: {unexpected_arg}"),
            [] => break,
        }
    }

    Ok(args)
}

async fn process_socket(mut incoming: TcpStream, auth: &AuthConfig, handshake_timeout: Duration) -> anyhow::Result<()> {
    // Dropping the handshake on timeout also drops any socket it was setting up.
    let outcome = tokio::time::timeout(handshake_timeout, accept(&mut incoming, auth, &TokioNetwork))
        .await
        .with_context(|| format!("handshake timed out after {handshake_timeout:?}"))?;

    let mut info = outcome.into_result().context("SOCKS5 handshake failed")?;

    match info.take_bound_socket() {
        Some(BoundSocket::Tcp(mut target)) => {
            info!(
                dest = %info.dest_address,
                port = info.dest_port,
                user = info.username(),
                "Relaying TCP stream"
            );

            let (to_target, to_client) = tokio::io::copy_bidirectional(&mut incoming, &mut target)
                .await
                .context("relay failed")?;

            debug!(to_target, to_client, "Relay ended");
        }
        Some(BoundSocket::Udp(socket)) => {
            info!(relay = ?socket.local_addr().ok(), user = info.username(), "UDP association established");

            // The association lasts as long as the control connection.
            wait_for_close(&mut incoming).await.context("control connection failed")?;

            debug!("UDP association released");
        }
        None => anyhow::bail!("handshake succeeded without a bound socket"),
    }

    Ok(())
}

async fn wait_for_close(stream: &mut TcpStream) -> std::io::Result<()> {
    let mut buf = [0; 512];

    while stream.read(&mut buf).await? != 0 {}

    Ok(())
}
