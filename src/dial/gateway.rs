//! Container gateway strategy: on Docker Engine the default route's gateway is the host.
use std::fs::File;
use std::io::BufReader;
use std::net::{Ipv4Addr, TcpStream};
use std::path::Path;

use super::{dial_timeout, DialError};

#[cfg(target_os = "linux")]
const ROUTE_TABLE: &str = "/proc/net/route";

/// Default gateway from a route table in `/proc/net/route` format.
pub fn gateway_from_file(path: &Path) -> Option<Ipv4Addr> {
    let f = File::open(path).ok()?;
    super::route::parse_default_gateway(BufReader::new(f))
}

#[cfg(target_os = "linux")]
pub fn default_gateway() -> Option<Ipv4Addr> {
    gateway_from_file(Path::new(ROUTE_TABLE))
}

#[cfg(not(target_os = "linux"))]
pub fn default_gateway() -> Option<Ipv4Addr> {
    None
}

pub fn dial_by_gateway_address(port: u16) -> Result<TcpStream, DialError> {
    let gw = default_gateway().ok_or(DialError::Unavailable)?;
    let host = gw.to_string();
    dial_timeout(&host, port).map_err(|e| {
        tracing::debug!("dial {host}:{port} (default gateway): {e}");
        DialError::Unavailable
    })
}
