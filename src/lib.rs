/*!
git-ssh-uplift: run git-over-SSH from inside a container through the host's ssh.

Architecture
- The shim (src/bin/git-ssh-uplift-shim.rs) stands in for `ssh` inside the container:
  it finds the proxy, sends one request header, then relays its stdin/stdout.
- The proxy (src/main.rs) listens on the host, decodes the header, runs
  `ssh -x [user@]host "<service> '<repo>'"` and relays the connection to its stdio.
- One TCP connection carries exactly one git operation.

Key modules
- proto: request header and its length-prefixed codec; service name table.
- dial: proxy address autodetection (override, default gateway, host.docker.internal).
- limiter: admission control taken before accept.
- server: accept loop, shutdown handle, per-connection sessions.
- pipe: subprocess <-> connection relay with half-close ordering.
- proxy: process lifecycle (bind, optional child command, signals).
- shim: client session over the shim's own stdio.

Environment
- UPLIFT_PORT: port the shim dials (SSH_UPLIFT_PORT is accepted as a fallback).
- UPLIFT_HOST: explicit proxy host; disables autodetection.
- SSH_UPLIFT_PORT: exported by the proxy to the command it runs.
- GIT_SSH_UPLIFT_LOG: tracing EnvFilter directives for either binary.
*/
pub mod config;
pub mod dial;
pub mod errors;
pub mod limiter;
pub mod logging;
pub mod pipe;
pub mod proto;
pub mod proxy;
pub mod server;
pub mod shim;
pub mod signals;

pub use config::{parse_bind_addr, ProxyConfig, ShimEnv};
pub use errors::{exit_code_for_error, exit_code_for_io_error, UpliftError};
pub use limiter::{Limiter, Slot};
pub use pipe::ProcArgs;
pub use proto::{read_header, write_header, GitService, Header};
pub use server::{serve, SessionConfig, ShutdownHandle};
