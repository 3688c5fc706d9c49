/*!
Request header exchanged once per connection, before raw SSH bytes.

Wire format:
- 4-byte big-endian length of the document that follows (at most MAX_HEADER_LEN).
- A field-tagged serde document carrying the service name and three strings.

Encode/decode happen exactly once per connection and complete before any byte
relay starts on it.
*/
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::UpliftError;

/// Upper bound on the encoded document; anything larger is rejected as malformed.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GitService {
    /// client <- pull <- server
    #[serde(rename = "upload-pack")]
    UploadPack = 0,
    /// client -> push -> server
    #[serde(rename = "receive-pack")]
    ReceivePack = 1,
}

/// Service <-> remote command name, indexed by discriminant.
pub static SERVICES: [(GitService, &str); 2] = [
    (GitService::UploadPack, "git-upload-pack"),
    (GitService::ReceivePack, "git-receive-pack"),
];

impl GitService {
    /// Remote command git runs for this service, e.g. `git-upload-pack`.
    pub fn command_name(self) -> &'static str {
        SERVICES[self as usize].1
    }
}

impl FromStr for GitService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SERVICES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(svc, _)| *svc)
            .ok_or_else(|| format!("invalid git service: {s}"))
    }
}

impl fmt::Display for GitService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub service: GitService,
    /// Empty means no explicit user; ssh picks its default.
    #[serde(default)]
    pub username: String,
    pub hostname: String,
    /// Empty is read as "." by the proxy, not by the codec.
    #[serde(default)]
    pub repository_path: String,
}

/// Write `hdr` as one length-prefixed document.
pub fn write_header<W: Write>(w: &mut W, hdr: &Header) -> Result<(), UpliftError> {
    let body = serde_json::to_vec(hdr).map_err(|e| UpliftError::Io(io::Error::other(e)))?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|n| (*n as usize) <= MAX_HEADER_LEN)
        .ok_or_else(|| UpliftError::Config(format!("header too large: {} bytes", body.len())))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

/// Read exactly one header and nothing past it.
pub fn read_header<R: Read>(r: &mut R) -> Result<Header, UpliftError> {
    let mut len_buf = [0u8; 4];
    read_exact_or_malformed(r, &mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_HEADER_LEN {
        return Err(UpliftError::MalformedHeader(format!("length {len} out of range")));
    }
    let mut body = vec![0u8; len];
    read_exact_or_malformed(r, &mut body)?;
    serde_json::from_slice(&body).map_err(|e| UpliftError::MalformedHeader(e.to_string()))
}

fn read_exact_or_malformed<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), UpliftError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => UpliftError::MalformedHeader("unexpected EOF".into()),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            UpliftError::MalformedHeader("timed out waiting for header".into())
        }
        _ => UpliftError::Io(e),
    })
}
