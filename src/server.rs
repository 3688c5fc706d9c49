/*!
Accept loop and per-connection sessions.

- A limiter slot is taken before accept and released when the session ends.
- The listener is polled non-blocking; closing it via `ShutdownHandle` ends the
  loop cleanly (serve returns Ok). In-flight sessions keep running.
- Any other accept failure is fatal and returned to the caller.
- Session failures are logged and never stop the loop.
*/
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::errors::UpliftError;
use crate::limiter::{Limiter, Slot};
use crate::pipe::ProcArgs;
use crate::proto::read_header;

/// Poll interval for the non-blocking accept and the limiter wait.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A client that connects and never sends a header gives up its slot after this.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloneable stop switch for `serve`.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    closed: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the listener; `serve` returns Ok at its next poll.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Per-session settings shared by every connection.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ssh_program: PathBuf,
    pub header_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ssh_program: PathBuf::from("ssh"),
            header_timeout: HEADER_READ_TIMEOUT,
        }
    }
}

/// Run the accept loop until `shutdown` is closed or accept fails.
pub fn serve(
    listener: TcpListener,
    limiter: Limiter,
    session: Arc<SessionConfig>,
    shutdown: ShutdownHandle,
) -> Result<(), UpliftError> {
    listener.set_nonblocking(true).map_err(UpliftError::Accept)?;
    loop {
        let Some(slot) = acquire_or_closed(&limiter, &shutdown) else {
            break;
        };
        let Some((stream, peer)) = accept_or_closed(&listener, &shutdown)? else {
            break;
        };
        let session = session.clone();
        thread::spawn(move || run_session(stream, peer, &session, slot));
    }
    // Dropping the listener closes it; queued connections are reset by the kernel.
    drop(listener);
    tracing::debug!("accept loop stopped");
    Ok(())
}

fn acquire_or_closed(limiter: &Limiter, shutdown: &ShutdownHandle) -> Option<Slot> {
    loop {
        if shutdown.is_closed() {
            return None;
        }
        if let Some(slot) = limiter.acquire_timeout(POLL_INTERVAL) {
            return Some(slot);
        }
    }
}

fn accept_or_closed(
    listener: &TcpListener,
    shutdown: &ShutdownHandle,
) -> Result<Option<(TcpStream, SocketAddr)>, UpliftError> {
    loop {
        if shutdown.is_closed() {
            return Ok(None);
        }
        match listener.accept() {
            Ok(pair) => return Ok(Some(pair)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(UpliftError::Accept(e)),
        }
    }
}

fn run_session(stream: TcpStream, peer: SocketAddr, session: &SessionConfig, slot: Slot) {
    tracing::debug!("session {peer}: accepted");
    if let Err(e) = proxy(stream, session) {
        tracing::warn!("proxy: {e}");
    } else {
        tracing::debug!("session {peer}: done");
    }
    // Connection and subprocess are gone by now; give the slot back last.
    drop(slot);
}

/// Decode the header from `stream`, then bridge it with the derived ssh call.
pub fn proxy(mut stream: TcpStream, session: &SessionConfig) -> Result<(), UpliftError> {
    // Accepted sockets may inherit O_NONBLOCK from the listener on some platforms.
    stream.set_nonblocking(false)?;
    let _ = stream.set_nodelay(true);
    stream.set_read_timeout(Some(session.header_timeout))?;
    let hdr = read_header(&mut stream)?;
    stream.set_read_timeout(None)?;

    let args = ProcArgs::ssh(&hdr, &session.ssh_program)?;
    tracing::debug!("exec: {args}");
    args.exec_piped(stream)
}
