use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use socks5_acceptor::{AuthConfig, AuthMethod, MethodList, StaticUsers, UdpBindFallback};

use crate::Args;

const DEFAULT_PORT: u16 = 1080;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_LOG_FILTER: &str = "info";

/// Resolved server configuration.
#[derive(Debug)]
pub(crate) struct Conf {
    pub(crate) listener: SocketAddr,
    pub(crate) auth: AuthConfig,
    pub(crate) handshake_timeout: Duration,
    pub(crate) log_filter: String,
}

impl Conf {
    /// Merges the command line with the configuration file it points to, if any.
    pub(crate) fn load(args: &Args<'_>) -> anyhow::Result<Self> {
        let conf_file = match args.config {
            Some(path) => load_conf_file(Path::new(path))?,
            None => dto::ConfFile::default(),
        };

        Self::from_conf_file(args, conf_file)
    }

    pub(crate) fn from_conf_file(args: &Args<'_>, conf_file: dto::ConfFile) -> anyhow::Result<Self> {
        let port = args.port.or(conf_file.port).unwrap_or(DEFAULT_PORT);
        let bind = args
            .bind
            .or(conf_file.bind)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let users = if args.users.is_empty() {
            conf_file
                .users
                .unwrap_or_default()
                .into_iter()
                .map(|user| (user.username, user.password))
                .collect()
        } else {
            args.users
                .iter()
                .map(|(username, password)| ((*username).to_owned(), (*password).to_owned()))
                .collect()
        };

        let no_auth_required = args.no_auth_required || conf_file.no_auth_required.unwrap_or(false);

        let udp_bind_fallback = conf_file.udp_bind_fallback.map(UdpBindFallback::from).unwrap_or_default();

        let auth = build_auth_config(users, no_auth_required, udp_bind_fallback)?;

        let handshake_timeout = args
            .handshake_timeout
            .or(conf_file.handshake_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT);

        anyhow::ensure!(!handshake_timeout.is_zero(), "handshake timeout must be greater than zero");

        let log_filter = args
            .log_filter
            .map(str::to_owned)
            .or(conf_file.log_filter)
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());

        Ok(Self {
            listener: SocketAddr::new(bind, port),
            auth,
            handshake_timeout,
            log_filter,
        })
    }
}

/// Builds the acceptor configuration, password first when users are configured.
fn build_auth_config(
    users: Vec<(String, String)>,
    no_auth_required: bool,
    udp_bind_fallback: UdpBindFallback,
) -> anyhow::Result<AuthConfig> {
    let mut supported_methods = MethodList::new();

    if !users.is_empty() {
        supported_methods.push(AuthMethod::Password)?;
    }

    if no_auth_required {
        supported_methods.push(AuthMethod::Anonymous)?;
    }

    anyhow::ensure!(
        !supported_methods.is_empty(),
        "no authentication method enabled: configure at least one user or allow anonymous access"
    );

    Ok(AuthConfig {
        supported_methods,
        authenticator: Arc::new(StaticUsers::new(users)),
        udp_bind_fallback,
    })
}

fn load_conf_file(conf_path: &Path) -> anyhow::Result<dto::ConfFile> {
    let file = File::open(conf_path).with_context(|| format!("couldn't open config file at {}", conf_path.display()))?;

    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid config file at {}", conf_path.display()))
}

pub(crate) mod dto {
    use core::fmt;
    use std::net::IpAddr;

    use serde::Deserialize;
    use socks5_acceptor::UdpBindFallback;

    /// JSON configuration file, as close as possible to what is on disk.
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub(crate) struct ConfFile {
        /// Address to listen on (default: 0.0.0.0)
        pub(crate) bind: Option<IpAddr>,
        /// Port to listen on (default: 1080)
        pub(crate) port: Option<u16>,
        /// Accept clients without authentication
        pub(crate) no_auth_required: Option<bool>,
        /// Users allowed to authenticate with a username and a password
        pub(crate) users: Option<Vec<UserConf>>,
        pub(crate) handshake_timeout_secs: Option<u64>,
        /// Family of the UDP relay socket when the UDP ASSOCIATE destination can't be resolved
        pub(crate) udp_bind_fallback: Option<UdpBindFallbackConf>,
        /// Directive string in the same form as the RUST_LOG environment variable
        pub(crate) log_filter: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub(crate) struct UserConf {
        pub(crate) username: String,
        pub(crate) password: String,
    }

    impl fmt::Debug for UserConf {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("UserConf")
                .field("username", &self.username)
                .finish_non_exhaustive()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
    pub(crate) enum UdpBindFallbackConf {
        ControlConnection,
        Ipv4,
        Ipv6,
    }

    impl From<UdpBindFallbackConf> for UdpBindFallback {
        fn from(value: UdpBindFallbackConf) -> Self {
            match value {
                UdpBindFallbackConf::ControlConnection => UdpBindFallback::ControlConnection,
                UdpBindFallbackConf::Ipv4 => UdpBindFallback::Ipv4,
                UdpBindFallbackConf::Ipv6 => UdpBindFallback::Ipv6,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use socks5_acceptor::Credentials;

    use super::*;

    fn conf_file(json: &str) -> dto::ConfFile {
        serde_json::from_str(json).expect("valid config file")
    }

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    #[test]
    fn defaults_require_a_method() {
        let error = Conf::from_conf_file(&Args::default(), dto::ConfFile::default()).expect_err("no method enabled");
        assert!(error.to_string().contains("no authentication method"), "{error}");
    }

    #[test]
    fn anonymous_only() {
        let args = Args {
            no_auth_required: true,
            ..Args::default()
        };

        let conf = Conf::from_conf_file(&args, dto::ConfFile::default()).expect("valid configuration");

        assert_eq!(conf.listener, "0.0.0.0:1080".parse().expect("valid address"));
        assert_eq!(conf.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(
            conf.auth.supported_methods.iter().collect::<Vec<_>>(),
            [AuthMethod::Anonymous]
        );
    }

    #[test]
    fn password_is_preferred() {
        let args = Args {
            no_auth_required: true,
            users: vec![("alice", "wonderland")],
            ..Args::default()
        };

        let conf = Conf::from_conf_file(&args, dto::ConfFile::default()).expect("valid configuration");

        assert_eq!(
            conf.auth.supported_methods.iter().collect::<Vec<_>>(),
            [AuthMethod::Password, AuthMethod::Anonymous]
        );
        assert!(conf.auth.authenticator.authenticate(&credentials("alice", "wonderland")));
        assert!(!conf.auth.authenticator.authenticate(&credentials("alice", "rabbits")));
    }

    #[test]
    fn file_values() {
        let file = conf_file(
            r#"{
                "Bind": "127.0.0.1",
                "Port": 9050,
                "Users": [{ "Username": "bob", "Password": "xyz" }],
                "HandshakeTimeoutSecs": 3,
                "UdpBindFallback": "Ipv6",
                "LogFilter": "debug"
            }"#,
        );

        let conf = Conf::from_conf_file(&Args::default(), file).expect("valid configuration");

        assert_eq!(conf.listener, "127.0.0.1:9050".parse().expect("valid address"));
        assert_eq!(conf.handshake_timeout, Duration::from_secs(3));
        assert_eq!(conf.auth.udp_bind_fallback, UdpBindFallback::Ipv6);
        assert_eq!(conf.log_filter, "debug");
        assert!(conf.auth.authenticator.authenticate(&credentials("bob", "xyz")));
    }

    #[test]
    fn flags_override_file() {
        let file = conf_file(
            r#"{
                "Port": 9050,
                "Users": [{ "Username": "bob", "Password": "xyz" }],
                "LogFilter": "debug"
            }"#,
        );

        let args = Args {
            port: Some(1081),
            users: vec![("alice", "wonderland")],
            log_filter: Some("trace"),
            handshake_timeout: Some(30),
            ..Args::default()
        };

        let conf = Conf::from_conf_file(&args, file).expect("valid configuration");

        assert_eq!(conf.listener.port(), 1081);
        assert_eq!(conf.log_filter, "trace");
        assert_eq!(conf.handshake_timeout, Duration::from_secs(30));
        assert!(conf.auth.authenticator.authenticate(&credentials("alice", "wonderland")));
        assert!(!conf.auth.authenticator.authenticate(&credentials("bob", "xyz")));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let args = Args {
            no_auth_required: true,
            handshake_timeout: Some(0),
            ..Args::default()
        };

        assert!(Conf::from_conf_file(&args, dto::ConfFile::default()).is_err());
    }

    #[test]
    fn unknown_fallback_is_rejected() {
        let result = serde_json::from_str::<dto::ConfFile>(r#"{ "UdpBindFallback": "Ipx" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn passwords_are_not_logged() {
        let file = conf_file(r#"{ "Users": [{ "Username": "bob", "Password": "hunter2" }] }"#);
        let debug = format!("{file:?}");

        assert!(debug.contains("bob"));
        assert!(!debug.contains("hunter2"));
    }
}
