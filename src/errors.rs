//! Error mapping guide:
//! - Map io::ErrorKind::NotFound to exit code 127; a child's non-zero exit to its
//!   own code; all others to 1.
//! - Per-session errors (bad header, spawn, exit, relay I/O) are logged by the
//!   accept loop and never escape it.
//! - Accept/bind failures and resolver exhaustion are fatal to the process.
use std::fmt;
use std::io;

/// Errors surfaced by the shim, the proxy accept loop and proxy sessions.
#[derive(Debug)]
pub enum UpliftError {
    /// I/O failure on a connection, a pipe or a socket option.
    Io(io::Error),
    /// Missing or invalid configuration (environment, flags).
    Config(String),
    /// The request header could not be decoded or failed validation.
    MalformedHeader(String),
    /// Every dial strategy was tried and none reached the proxy.
    Unresolvable,
    /// The subprocess could not be started.
    Spawn { program: String, source: io::Error },
    /// The subprocess exited unsuccessfully; `code` is `None` when killed by a signal.
    Exit { program: String, code: Option<i32> },
    /// The listener could not be bound.
    Bind(io::Error),
    /// The listener failed for a reason other than being closed during shutdown.
    Accept(io::Error),
}

impl fmt::Display for UpliftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpliftError::Io(e) => write!(f, "{e}"),
            UpliftError::Config(msg) => f.write_str(msg),
            UpliftError::MalformedHeader(msg) => write!(f, "bad header: {msg}"),
            UpliftError::Unresolvable => {
                f.write_str("unable to autodetect proxy address - try again with UPLIFT_HOST")
            }
            UpliftError::Spawn { program, source } => write!(f, "{program}: {source}"),
            UpliftError::Exit {
                program,
                code: Some(code),
            } => write!(f, "{program} exited with code {code}"),
            UpliftError::Exit {
                program,
                code: None,
            } => write!(f, "{program} terminated by signal"),
            UpliftError::Bind(e) => write!(f, "bind failed: {e}"),
            UpliftError::Accept(e) => write!(f, "accept failed: {e}"),
        }
    }
}

impl std::error::Error for UpliftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpliftError::Io(e) | UpliftError::Bind(e) | UpliftError::Accept(e) => Some(e),
            UpliftError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for UpliftError {
    fn from(e: io::Error) -> Self {
        UpliftError::Io(e)
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Convert UpliftError to exit code (parity with io::Error mapping).
pub fn exit_code_for_error(e: &UpliftError) -> u8 {
    match e {
        UpliftError::Io(ioe) | UpliftError::Bind(ioe) | UpliftError::Accept(ioe) => {
            exit_code_for_io_error(ioe)
        }
        UpliftError::Spawn { source, .. } => exit_code_for_io_error(source),
        UpliftError::Exit {
            code: Some(code), ..
        } => u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(1),
        _ => 1,
    }
}
