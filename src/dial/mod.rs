/*!
Proxy address autodetection for the shim.

Strategies are tried in a fixed order and the first one that does not report
`Unavailable` decides the outcome:
1. UPLIFT_HOST override; a failed dial here is final.
2. Default gateway from the kernel routing table (Docker Engine on Linux).
3. host.docker.internal (Docker Desktop, or `--add-host ...:host-gateway`).

See https://github.com/moby/moby/pull/40007 for background on 2 and 3.
*/
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::ShimEnv;
use crate::errors::UpliftError;

pub mod gateway;
pub mod route;

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Hostname container runtimes map to the host.
pub const DOCKER_HOST_ALIAS: &str = "host.docker.internal";

#[derive(Debug)]
pub enum DialError {
    /// Strategy does not apply here or its endpoint did not answer; try the next one.
    Unavailable,
    /// Stop the chain and report this error.
    Failed(io::Error),
}

/// Connect to `host:port`, trying each resolved address with DIAL_TIMEOUT.
pub fn dial_timeout(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, DIAL_TIMEOUT) {
            Ok(s) => return Ok(s),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{host}: no addresses resolved"),
        )
    }))
}

/// A named strategy producing a connection of type `C`.
pub type DialMethod<'a, C> = (&'a str, &'a dyn Fn() -> Result<C, DialError>);

/// Run `methods` in order until one connects or fails for good.
pub fn dial_first<C>(methods: &[DialMethod<'_, C>]) -> Result<C, UpliftError> {
    for (name, method) in methods {
        match method() {
            Ok(conn) => {
                tracing::debug!("connected via {name}");
                return Ok(conn);
            }
            Err(DialError::Unavailable) => {
                tracing::debug!("dial method {name} unavailable");
                continue;
            }
            Err(DialError::Failed(e)) => return Err(UpliftError::Io(e)),
        }
    }
    Err(UpliftError::Unresolvable)
}

pub fn dial_by_uplift_host(host: Option<&str>, port: u16) -> Result<TcpStream, DialError> {
    let host = host.ok_or(DialError::Unavailable)?;
    dial_timeout(host, port).map_err(|e| {
        DialError::Failed(io::Error::new(e.kind(), format!("dial {host}:{port}: {e}")))
    })
}

pub fn dial_by_docker_internal(port: u16) -> Result<TcpStream, DialError> {
    dial_timeout(DOCKER_HOST_ALIAS, port).map_err(|e| {
        tracing::debug!("dial {DOCKER_HOST_ALIAS}:{port}: {e}");
        DialError::Unavailable
    })
}

/// Locate and connect to the proxy.
pub fn dial(env: &ShimEnv) -> Result<TcpStream, UpliftError> {
    let port = env.port;
    let by_host = || dial_by_uplift_host(env.host.as_deref(), port);
    let by_gateway = || gateway::dial_by_gateway_address(port);
    let by_alias = || dial_by_docker_internal(port);
    let methods: [DialMethod<'_, TcpStream>; 3] = [
        ("UPLIFT_HOST", &by_host),
        ("default gateway", &by_gateway),
        (DOCKER_HOST_ALIAS, &by_alias),
    ];
    dial_first(&methods)
}
