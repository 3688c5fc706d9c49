use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::errors::UpliftError;

/// Port the shim dials; required.
pub const ENV_UPLIFT_PORT: &str = "UPLIFT_PORT";
/// Explicit proxy host; optional, wins over autodetection.
pub const ENV_UPLIFT_HOST: &str = "UPLIFT_HOST";
/// Set by the proxy in the environment of the command it launches.
pub const ENV_SSH_UPLIFT_PORT: &str = "SSH_UPLIFT_PORT";

/// Read a required numeric port from the environment.
pub fn env_port(name: &str) -> Result<u16, UpliftError> {
    let raw = env::var(name).unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UpliftError::Config(format!(
            "environment: missing required variable: {name}"
        )));
    }
    raw.parse::<u16>()
        .map_err(|e| UpliftError::Config(format!("environment: {name}: {e}")))
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Shim-side settings taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimEnv {
    pub host: Option<String>,
    pub port: u16,
}

impl ShimEnv {
    pub fn from_env() -> Result<Self, UpliftError> {
        // Shims nested under `git-ssh-uplift <cmd>` only see SSH_UPLIFT_PORT.
        // A set but unparsable UPLIFT_PORT is an error, never a reason to fall back.
        let name = if env_nonempty(ENV_UPLIFT_PORT).is_none()
            && env_nonempty(ENV_SSH_UPLIFT_PORT).is_some()
        {
            ENV_SSH_UPLIFT_PORT
        } else {
            ENV_UPLIFT_PORT
        };
        let port = env_port(name)?;
        Ok(ShimEnv {
            host: env_nonempty(ENV_UPLIFT_HOST),
            port,
        })
    }
}

/// Parse `[host]:[port]`; host defaults to all addresses, port to a random one.
pub fn parse_bind_addr(s: &str) -> Result<SocketAddr, String> {
    let s = s.trim();
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected [host]:[port], got '{s}'"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    let port: u16 = if port.is_empty() {
        0
    } else {
        port.parse()
            .map_err(|e| format!("invalid port '{port}': {e}"))?
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("{host}: {e}"))?
        .next()
        .ok_or_else(|| format!("{host}: no addresses"))
}

/// Proxy-side settings, already validated by the CLI layer.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind: SocketAddr,
    /// None or 0 admits any number of concurrent sessions.
    pub conns_max: Option<u32>,
    pub ssh_program: PathBuf,
    /// Command (with arguments) to run once listening; the proxy exits with it.
    pub command: Vec<String>,
    pub verbose: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            conns_max: None,
            ssh_program: PathBuf::from("ssh"),
            command: Vec::new(),
            verbose: false,
        }
    }
}
