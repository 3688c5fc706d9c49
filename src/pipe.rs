/*!
Run a subprocess with its stdin/stdout bridged to a TCP connection.

A plain "wait for exit, then finish copying" ordering deadlocks here: the
subprocess stdin is fed from a connection that stays open after the subprocess
has exited, so the stdin copy never sees EOF. Instead three activities run
concurrently and are all awaited:

1. connection -> subprocess stdin
2. subprocess stdout -> connection; then half-close the connection's write side
3. wait for the subprocess to exit

Once 2 and 3 are done the read side is shut down too, which returns activity 1
even if the peer never closes its end. The first error reported by any activity
is the result.
*/
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::errors::UpliftError;
use crate::proto::Header;

/// Program and arguments of a subprocess to bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcArgs {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProcArgs {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        ProcArgs {
            program: program.into(),
            args,
        }
    }

    /// `ssh -x [user@]host "<service> '<repo>'"` for a decoded header.
    pub fn ssh(hdr: &Header, ssh_program: &Path) -> Result<Self, UpliftError> {
        if hdr.hostname.is_empty() {
            return Err(UpliftError::MalformedHeader("missing hostname".into()));
        }
        // Either would land in ssh's option position.
        if hdr.hostname.starts_with('-') {
            return Err(UpliftError::MalformedHeader(format!(
                "strange hostname '{}' blocked",
                hdr.hostname
            )));
        }
        if hdr.username.starts_with('-') {
            return Err(UpliftError::MalformedHeader(format!(
                "strange username '{}' blocked",
                hdr.username
            )));
        }
        let userhost = if hdr.username.is_empty() {
            hdr.hostname.clone()
        } else {
            format!("{}@{}", hdr.username, hdr.hostname)
        };
        let repo = if hdr.repository_path.is_empty() {
            "."
        } else {
            hdr.repository_path.as_str()
        };
        Ok(ProcArgs::new(
            ssh_program,
            vec![
                "-x".to_string(),
                userhost,
                format!("{} '{}'", hdr.service.command_name(), repo),
            ],
        ))
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Run the subprocess and relay `conn` to/from its stdio until both finish.
    pub fn exec_piped(&self, conn: TcpStream) -> Result<(), UpliftError> {
        let program = which::which(&self.program).map_err(|e| UpliftError::Spawn {
            program: self.program_name(),
            source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
        })?;
        let mut child = Command::new(&program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| UpliftError::Spawn {
                program: self.program_name(),
                source: e,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(UpliftError::Io(io::Error::other("subprocess stdio not captured")));
            }
        };
        let (conn_in, conn_out) = match (conn.try_clone(), conn.try_clone()) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(UpliftError::Io(e));
            }
        };

        let (tx, rx) = mpsc::channel::<(Activity, Result<(), UpliftError>)>();

        let tx_in = tx.clone();
        thread::spawn(move || {
            let res = copy_to_stdin(conn_in, stdin);
            let _ = tx_in.send((Activity::Input, res));
        });

        let tx_out = tx.clone();
        thread::spawn(move || {
            let res = copy_from_stdout(stdout, conn_out);
            let _ = tx_out.send((Activity::Output, res));
        });

        let program_name = self.program_name();
        thread::spawn(move || {
            let res = child
                .wait()
                .map_err(UpliftError::Io)
                .and_then(|st| exit_result(&program_name, st));
            let _ = tx.send((Activity::Exit, res));
        });

        let mut first_err: Option<UpliftError> = None;
        let (mut output_done, mut exit_done, mut input_done) = (false, false, false);
        for (activity, res) in rx.iter().take(3) {
            match activity {
                Activity::Input => input_done = true,
                Activity::Output => output_done = true,
                Activity::Exit => exit_done = true,
            }
            if let Err(e) = res {
                tracing::debug!("{activity}: {e}");
                first_err.get_or_insert(e);
            }
            if output_done && exit_done && !input_done {
                // Nothing left to feed; release the stdin copy parked on the connection.
                let _ = conn.shutdown(Shutdown::Read);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl fmt::Display for ProcArgs {
    /// Shell-like preview; arguments containing spaces are double-quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            if a.contains(char::is_whitespace) {
                write!(f, " \"{a}\"")?;
            } else {
                write!(f, " {a}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Input,
    Output,
    Exit,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Activity::Input => "copy connection->stdin",
            Activity::Output => "copy stdout->connection",
            Activity::Exit => "wait",
        })
    }
}

fn copy_to_stdin<R: Read, W: Write>(mut from: R, mut stdin: W) -> Result<(), UpliftError> {
    match io::copy(&mut from, &mut stdin) {
        Ok(_) => Ok(()),
        // The subprocess closed stdin (usually by exiting); nothing more to deliver.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(UpliftError::Io(e)),
    }
    // stdin drops here so the subprocess sees EOF.
}

fn copy_from_stdout<R: Read>(mut stdout: R, mut conn: TcpStream) -> Result<(), UpliftError> {
    let res = io::copy(&mut stdout, &mut conn).and_then(|_| conn.flush());
    // Tell the peer no more data is coming; must follow the copy.
    let _ = conn.shutdown(Shutdown::Write);
    res.map_err(UpliftError::Io)
}

fn exit_result(program: &str, status: ExitStatus) -> Result<(), UpliftError> {
    if status.success() {
        Ok(())
    } else {
        Err(UpliftError::Exit {
            program: program.to_string(),
            code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::GitService;

    fn header(service: GitService, user: &str, host: &str, repo: &str) -> Header {
        Header {
            service,
            username: user.into(),
            hostname: host.into(),
            repository_path: repo.into(),
        }
    }

    #[test]
    fn test_ssh_args_without_user() {
        let p = ProcArgs::ssh(
            &header(GitService::UploadPack, "", "example.com", "myrepo.git"),
            Path::new("ssh"),
        )
        .expect("args");
        assert_eq!(p.program, PathBuf::from("ssh"));
        assert_eq!(
            p.args,
            vec!["-x", "example.com", "git-upload-pack 'myrepo.git'"]
        );
        assert_eq!(
            p.to_string(),
            r#"ssh -x example.com "git-upload-pack 'myrepo.git'""#
        );
    }

    #[test]
    fn test_ssh_args_with_user_and_receive_pack() {
        let p = ProcArgs::ssh(
            &header(GitService::ReceivePack, "git", "github.com", "org/repo.git"),
            Path::new("/usr/bin/ssh"),
        )
        .expect("args");
        assert_eq!(
            p.args,
            vec!["-x", "git@github.com", "git-receive-pack 'org/repo.git'"]
        );
    }

    #[test]
    fn test_empty_repository_path_becomes_dot() {
        let p = ProcArgs::ssh(
            &header(GitService::UploadPack, "", "example.com", ""),
            Path::new("ssh"),
        )
        .expect("args");
        assert_eq!(p.args.last().unwrap(), "git-upload-pack '.'");
    }

    #[test]
    fn test_missing_hostname_is_malformed_header() {
        let err = ProcArgs::ssh(
            &header(GitService::UploadPack, "git", "", "repo"),
            Path::new("ssh"),
        )
        .unwrap_err();
        assert!(matches!(err, UpliftError::MalformedHeader(_)), "{err:?}");
        assert_eq!(err.to_string(), "bad header: missing hostname");
    }

    #[test]
    fn test_option_like_host_or_user_is_malformed_header() {
        let err = ProcArgs::ssh(
            &header(GitService::UploadPack, "", "-oProxyCommand=touch /tmp/x", "r"),
            Path::new("ssh"),
        )
        .unwrap_err();
        assert!(matches!(err, UpliftError::MalformedHeader(_)), "{err:?}");
        assert!(err.to_string().contains("strange hostname"), "{err}");

        let err = ProcArgs::ssh(
            &header(GitService::ReceivePack, "-oProxyCommand=x", "example.com", "r"),
            Path::new("ssh"),
        )
        .unwrap_err();
        assert!(matches!(err, UpliftError::MalformedHeader(_)), "{err:?}");
        assert!(err.to_string().contains("strange username"), "{err}");

        // A dash later in the name is an ordinary hostname.
        let p = ProcArgs::ssh(
            &header(GitService::UploadPack, "git", "git-server.example.com", "r"),
            Path::new("ssh"),
        )
        .expect("args");
        assert_eq!(p.args[1], "git@git-server.example.com");
    }

    #[test]
    fn test_copy_to_stdin_treats_broken_pipe_as_end() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let res = copy_to_stdin(io::Cursor::new(b"late bytes".to_vec()), Closed);
        assert!(res.is_ok(), "{res:?}");
    }
}
