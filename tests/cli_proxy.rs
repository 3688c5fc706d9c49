#![cfg(unix)]
mod support;

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

const PROXY: &str = env!("CARGO_BIN_EXE_git-ssh-uplift");
const SHIM: &str = env!("CARGO_BIN_EXE_git-ssh-uplift-shim");

fn proxy() -> Command {
    let mut cmd = Command::new(PROXY);
    cmd.env_remove("SSH_UPLIFT_PORT")
        .env_remove("UPLIFT_PORT")
        .env_remove("GIT_SSH_UPLIFT_SSH")
        .env_remove("GIT_SSH_UPLIFT_LOG");
    cmd
}

#[test]
fn test_command_sees_bound_port() {
    let out = proxy()
        .args(["--bind", "127.0.0.1:", "sh", "-c", "echo port=$SSH_UPLIFT_PORT"])
        .output()
        .expect("run proxy");
    assert!(out.status.success(), "status: {:?}", out.status);
    let stdout = String::from_utf8_lossy(&out.stdout);
    let port = stdout
        .trim()
        .strip_prefix("port=")
        .unwrap_or_else(|| panic!("unexpected output: {stdout}"));
    let port: u16 = port.parse().expect("numeric port");
    assert_ne!(port, 0);
}

#[test]
fn test_exit_status_of_command_is_propagated() {
    let out = proxy()
        .args(["--bind", "127.0.0.1:0", "--", "sh", "-c", "exit 7"])
        .output()
        .expect("run proxy");
    assert_eq!(out.status.code(), Some(7));
}

#[test]
fn test_missing_command_exits_127() {
    let out = proxy()
        .args(["--bind", "127.0.0.1:0", "git-ssh-uplift-test-missing-command"])
        .output()
        .expect("run proxy");
    assert_eq!(out.status.code(), Some(127));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("git-ssh-uplift-test-missing-command"),
        "stderr: {stderr}"
    );
}

#[test]
fn test_invalid_bind_is_usage_error() {
    let out = proxy()
        .args(["--bind", "127.0.0.1:notaport", "true"])
        .output()
        .expect("run proxy");
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_shim_under_proxy_command_reaches_ssh() {
    if !support::have_program("echo") {
        return;
    }
    let mut child = proxy()
        .env("UPLIFT_HOST", "127.0.0.1")
        .args([
            "--bind",
            "127.0.0.1:",
            "--ssh-program",
            "echo",
            "--",
            SHIM,
            "git-upload-pack",
            "-",
            "example.com",
            "myrepo.git",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn proxy");

    // The shim inherits this pipe as stdin; keep it open until it is done.
    let _stdin = child.stdin.take();
    let mut out = String::new();
    child
        .stdout
        .take()
        .expect("stdout")
        .read_to_string(&mut out)
        .expect("read");
    let status = child.wait().expect("wait");
    assert!(status.success(), "status: {status:?}");
    assert_eq!(out.trim_end(), "-x example.com git-upload-pack 'myrepo.git'");
}

/// Read stderr lines until one contains `needle`; the reader stays usable after.
fn wait_for_log(stderr: &mut BufReader<ChildStderr>, needle: &str) {
    let mut line = String::new();
    loop {
        line.clear();
        let n = stderr.read_line(&mut line).expect("read stderr");
        assert!(n > 0, "proxy closed stderr before logging {needle:?}");
        if line.contains(needle) {
            return;
        }
    }
}

fn sigterm(child: &Child) {
    let pid = i32::try_from(child.id()).expect("pid");
    kill(Pid::from_raw(pid), Signal::SIGTERM).expect("send SIGTERM");
}

fn exit_within_deadline(child: &mut Child) -> ExitStatus {
    let mut status = None;
    let exited = support::wait_until(|| {
        status = child.try_wait().expect("try_wait");
        status.is_some()
    });
    if !exited {
        let _ = child.kill();
        let _ = child.wait();
        panic!("proxy did not exit after SIGTERM");
    }
    status.expect("status")
}

#[test]
fn test_sigterm_stops_serving_proxy_cleanly() {
    let mut child = proxy()
        .args(["--bind", "127.0.0.1:"])
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn proxy");
    let mut stderr = BufReader::new(child.stderr.take().expect("stderr"));
    wait_for_log(&mut stderr, "listening on port");

    sigterm(&child);
    let status = exit_within_deadline(&mut child);
    assert_eq!(status.code(), Some(0), "status: {status:?}");
}

#[test]
fn test_sigterm_terminates_running_command() {
    if !support::have_program("sleep") {
        return;
    }
    let start = std::time::Instant::now();
    let mut child = proxy()
        .args(["--verbose", "--bind", "127.0.0.1:", "sleep", "30"])
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn proxy");
    let mut stderr = BufReader::new(child.stderr.take().expect("stderr"));
    wait_for_log(&mut stderr, "running sleep");

    sigterm(&child);
    let status = exit_within_deadline(&mut child);
    // sleep was killed by SIGTERM rather than waited out.
    assert!(!status.success(), "status: {status:?}");
    assert!(start.elapsed() < support::DEADLINE);
}
