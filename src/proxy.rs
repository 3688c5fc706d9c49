/*!
Proxy process lifecycle: bind, serve, and optionally run a command alongside.

- Without a command the proxy serves until SIGINT/SIGTERM.
- With a command the proxy exports SSH_UPLIFT_PORT to it, and stops serving
  (exiting with the command's status) once it exits.
- A fatal accept-loop error ends the command and the proxy.
*/
use std::net::TcpListener;
use std::process::{Child, Command};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::config::{ProxyConfig, ENV_SSH_UPLIFT_PORT};
use crate::errors::UpliftError;
use crate::limiter::Limiter;
use crate::server::{serve, SessionConfig, ShutdownHandle, HEADER_READ_TIMEOUT};
use crate::signals::termination_requested;

const WATCH_INTERVAL: Duration = Duration::from_millis(50);

/// A bound, serving proxy.
pub struct Proxy {
    port: u16,
    shutdown: ShutdownHandle,
    handle: JoinHandle<Result<(), UpliftError>>,
}

impl Proxy {
    /// Bind `cfg.bind` and start the accept loop on its own thread.
    pub fn start(cfg: &ProxyConfig) -> Result<Self, UpliftError> {
        let listener = TcpListener::bind(cfg.bind).map_err(UpliftError::Bind)?;
        let port = listener.local_addr().map_err(UpliftError::Bind)?.port();
        let limiter = Limiter::new(cfg.conns_max);
        let session = Arc::new(SessionConfig {
            ssh_program: cfg.ssh_program.clone(),
            header_timeout: HEADER_READ_TIMEOUT,
        });
        let shutdown = ShutdownHandle::new();
        let shutdown_cl = shutdown.clone();
        tracing::debug!(
            "bound {} (max connections: {})",
            cfg.bind,
            limiter
                .capacity()
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
        );
        let handle = thread::Builder::new()
            .name("uplift-accept".into())
            .spawn(move || serve(listener, limiter, session, shutdown_cl))?;
        Ok(Proxy {
            port,
            shutdown,
            handle,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// True once the accept loop has returned (stopped or failed).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Close the listener and collect the accept loop's result.
    pub fn stop(self) -> Result<(), UpliftError> {
        self.shutdown.close();
        self.handle
            .join()
            .unwrap_or_else(|_| Err(UpliftError::Config("accept loop panicked".into())))
    }
}

/// Serve according to `cfg` until interrupted, the command exits, or accept fails.
pub fn run(cfg: &ProxyConfig) -> Result<(), UpliftError> {
    if cfg.verbose {
        tracing::info!(
            "build target={} profile={} rustc={} ver={}",
            env!("UPLIFT_BUILD_TARGET"),
            env!("UPLIFT_BUILD_PROFILE"),
            env!("UPLIFT_BUILD_RUSTC"),
            env!("CARGO_PKG_VERSION")
        );
    }
    let proxy = Proxy::start(cfg)?;
    let port = proxy.port();

    let Some((program, args)) = cfg.command.split_first() else {
        tracing::info!("listening on port {port} - ^C to exit");
        while !termination_requested() && !proxy.is_finished() {
            thread::sleep(WATCH_INTERVAL);
        }
        return proxy.stop();
    };

    let mut child = match Command::new(program)
        .args(args)
        .env(ENV_SSH_UPLIFT_PORT, port.to_string())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            let _ = proxy.stop();
            return Err(UpliftError::Spawn {
                program: program.clone(),
                source: e,
            });
        }
    };
    tracing::debug!("listening on port {port}; running {program}");

    let status = loop {
        match child.try_wait() {
            Ok(Some(st)) => break Ok(st),
            Ok(None) => {}
            Err(e) => break Err(UpliftError::Io(e)),
        }
        if termination_requested() || proxy.is_finished() {
            terminate(&mut child);
            break child.wait().map_err(UpliftError::Io);
        }
        thread::sleep(WATCH_INTERVAL);
    };

    // The accept loop error (if any) outranks the command's status.
    proxy.stop()?;
    let status = status?;
    if status.success() {
        Ok(())
    } else {
        Err(UpliftError::Exit {
            program: program.clone(),
            code: status.code(),
        })
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Ok(pid) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    if kill(Pid::from_raw(pid), Signal::SIGTERM).is_err() {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}
