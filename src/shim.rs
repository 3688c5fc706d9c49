//! Client side: dial the proxy, send the header, then relay our own stdio.
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;

use crate::config::ShimEnv;
use crate::dial;
use crate::errors::UpliftError;
use crate::proto::{write_header, GitService, Header};

/// Build a header from the four shim arguments; `-` as user means none.
pub fn header_from_args(service: GitService, user: &str, host: &str, repo: &str) -> Header {
    Header {
        service,
        username: if user == "-" {
            String::new()
        } else {
            user.to_string()
        },
        hostname: host.to_string(),
        repository_path: repo.to_string(),
    }
}

/// Locate the proxy and run one session over this process's stdin/stdout.
pub fn run(hdr: &Header, env: &ShimEnv) -> Result<(), UpliftError> {
    let conn = dial::dial(env)?;
    proxy(hdr, conn, io::stdin(), io::stdout())
}

/// Send `hdr` on `conn`, then copy `input` -> conn and conn -> `output`.
pub fn proxy<R, W>(
    hdr: &Header,
    mut conn: TcpStream,
    input: R,
    output: W,
) -> Result<(), UpliftError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    write_header(&mut conn, hdr)?;
    copy_stdio(conn, input, output)
}

/// Two concurrent copies; the first to finish (EOF or error) ends the session.
pub fn copy_stdio<R, W>(conn: TcpStream, mut input: R, mut output: W) -> Result<(), UpliftError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let mut conn_w = conn.try_clone()?;
    let mut conn_r = conn;
    let (tx, rx) = mpsc::channel::<io::Result<u64>>();

    let tx_up = tx.clone();
    thread::spawn(move || {
        let res = io::copy(&mut input, &mut conn_w);
        let _ = tx_up.send(res);
    });
    thread::spawn(move || {
        let res = io::copy(&mut conn_r, &mut output).and_then(|n| output.flush().map(|_| n));
        let _ = tx.send(res);
    });

    match rx.recv() {
        Ok(res) => res.map(|_| ()).map_err(UpliftError::Io),
        Err(_) => Err(UpliftError::Io(io::Error::other("relay threads exited"))),
    }
}
