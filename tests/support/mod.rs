#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use git_ssh_uplift::{
    serve, write_header, GitService, Header, Limiter, SessionConfig, ShutdownHandle, UpliftError,
};

/// Upper bound for anything a test waits on; far above normal completion times.
pub const DEADLINE: Duration = Duration::from_secs(10);

pub struct TestServer {
    pub port: u16,
    pub shutdown: ShutdownHandle,
    pub handle: JoinHandle<Result<(), UpliftError>>,
}

impl TestServer {
    pub fn stop(self) -> Result<(), UpliftError> {
        self.shutdown.close();
        self.handle.join().expect("accept loop panicked")
    }
}

/// Start `serve` on 127.0.0.1 with an ephemeral port.
pub fn start_server(ssh_program: &str, conns_max: Option<u32>) -> TestServer {
    start_server_with(ssh_program, conns_max, Duration::from_secs(30))
}

pub fn start_server_with(
    ssh_program: &str,
    conns_max: Option<u32>,
    header_timeout: Duration,
) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let session = Arc::new(SessionConfig {
        ssh_program: PathBuf::from(ssh_program),
        header_timeout,
    });
    let shutdown = ShutdownHandle::new();
    let sd = shutdown.clone();
    let handle = thread::spawn(move || serve(listener, Limiter::new(conns_max), session, sd));
    TestServer {
        port,
        shutdown,
        handle,
    }
}

pub fn connect(port: u16) -> TcpStream {
    let s = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    s.set_read_timeout(Some(DEADLINE)).expect("read timeout");
    s
}

pub fn header(service: GitService, user: &str, host: &str, repo: &str) -> Header {
    Header {
        service,
        username: user.to_string(),
        hostname: host.to_string(),
        repository_path: repo.to_string(),
    }
}

/// Send `hdr` and read everything the proxy writes back until it half-closes.
pub fn request(port: u16, hdr: &Header) -> String {
    let mut s = connect(port);
    write_header(&mut s, hdr).expect("write header");
    read_all(&mut s)
}

pub fn read_all(s: &mut TcpStream) -> String {
    let mut out = Vec::new();
    s.read_to_end(&mut out).expect("read until EOF");
    String::from_utf8_lossy(&out).into_owned()
}

/// Write raw bytes, then report whether the peer closed the connection.
pub fn peer_closes_after(port: u16, bytes: &[u8]) -> bool {
    let mut s = connect(port);
    let _ = s.write_all(bytes);
    let mut buf = [0u8; 64];
    matches!(s.read(&mut buf), Ok(0) | Err(_))
}

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

pub fn have_program(name: &str) -> bool {
    if which::which(name).is_ok() {
        true
    } else {
        eprintln!("skipping: {name} not found in PATH");
        false
    }
}
