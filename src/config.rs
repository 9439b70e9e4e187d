//! Runtime configuration, read from the environment the way the teacher's
//! binary reads `MOJANG_USER`/`MOJANG_USER_PWD` in its doc example, just with
//! a full settings surface instead of two ad-hoc `env::var` calls.

use std::env;
use std::net::SocketAddr;

use crate::errors::*;

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_owned())
}

/// Where the proxy listens, and which upstream server it connects new
/// sessions to.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub upstream_host: String,
    pub upstream_port: u16,
    /// Address sent in the handshake when it differs from `upstream_host`/
    /// `upstream_port` (servers that validate an SNI-like address).
    pub fake_host: String,
    pub fake_port: u16,
    /// Where broadcast peers connect; a second listener independent of
    /// `listen_addr` so a peer accept failure can never block the owner.
    pub broadcast_listen_addr: SocketAddr,
    /// Compression threshold advertised to the client; -1 disables
    /// compression entirely.
    pub compression_threshold: i32,
}

impl ProxyConfig {
    /// Reads `VITRUM_LISTEN`, `VITRUM_UPSTREAM_HOST`, `VITRUM_UPSTREAM_PORT`,
    /// `VITRUM_FAKE_HOST`/`VITRUM_FAKE_PORT`, `VITRUM_BROADCAST_LISTEN` and
    /// `VITRUM_COMPRESSION_THRESHOLD`.
    pub fn from_env() -> TetsuResult<Self> {
        let listen_addr = var_or("VITRUM_LISTEN", "127.0.0.1:41223")
            .parse()
            .map_err(|_| {
                Error::InvalidValue(InvalidValue {
                    expected: "VITRUM_LISTEN to be a socket address".to_owned(),
                })
            })?;
        let upstream_host = var_or("VITRUM_UPSTREAM_HOST", "mc.hypixel.net");
        let upstream_port = var_or("VITRUM_UPSTREAM_PORT", "25565")
            .parse()
            .map_err(|_| {
                Error::InvalidValue(InvalidValue {
                    expected: "VITRUM_UPSTREAM_PORT to be a u16".to_owned(),
                })
            })?;
        let fake_host = var_or("VITRUM_FAKE_HOST", &upstream_host);
        let fake_port = var_or("VITRUM_FAKE_PORT", &upstream_port.to_string())
            .parse()
            .map_err(|_| {
                Error::InvalidValue(InvalidValue {
                    expected: "VITRUM_FAKE_PORT to be a u16".to_owned(),
                })
            })?;
        let broadcast_listen_addr = var_or("VITRUM_BROADCAST_LISTEN", "127.0.0.1:41224")
            .parse()
            .map_err(|_| {
                Error::InvalidValue(InvalidValue {
                    expected: "VITRUM_BROADCAST_LISTEN to be a socket address".to_owned(),
                })
            })?;
        let compression_threshold = var_or("VITRUM_COMPRESSION_THRESHOLD", "256")
            .parse()
            .map_err(|_| {
                Error::InvalidValue(InvalidValue {
                    expected: "VITRUM_COMPRESSION_THRESHOLD to be an i32".to_owned(),
                })
            })?;

        Ok(Self {
            listen_addr,
            upstream_host,
            upstream_port,
            fake_host,
            fake_port,
            broadcast_listen_addr,
            compression_threshold,
        })
    }
}

/// Credentials source selection: a cached/refreshable Microsoft account, or
/// (for local testing against offline-mode servers) a bare username.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    Microsoft { username: String },
    Offline { username: String },
}

impl AuthConfig {
    /// `VITRUM_AUTH_USER` selects the account; `VITRUM_AUTH_MODE` of
    /// `offline` skips Microsoft auth entirely (for dev servers that don't
    /// enable `online-mode`).
    pub fn from_env() -> TetsuResult<Self> {
        let username = var("VITRUM_AUTH_USER").ok_or_else(|| {
            Error::InvalidValue(InvalidValue {
                expected: "VITRUM_AUTH_USER to be set".to_owned(),
            })
        })?;

        match var_or("VITRUM_AUTH_MODE", "microsoft").as_str() {
            "offline" => Ok(Self::Offline { username }),
            _ => Ok(Self::Microsoft { username }),
        }
    }
}

/// Directories the credential store and server-id cache are kept under.
/// Grounded on the same `directories` crate use as the corpus's other
/// platform-data-dir consumers.
pub struct StorageConfig {
    pub qualifier: String,
    pub organization: String,
    pub application: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            qualifier: String::new(),
            organization: String::new(),
            application: String::from("vitrum"),
        }
    }
}

/// Initializes the teacher's logging stack (`log` + `env_logger`) once per
/// process. Controlled by `RUST_LOG` the usual way; defaults to `info`.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
