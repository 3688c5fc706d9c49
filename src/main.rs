use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use git_ssh_uplift::{
    exit_code_for_error, logging, parse_bind_addr, proxy, signals, ProxyConfig, UpliftError,
};

const PROG: &str = "git-ssh-uplift";

#[derive(Parser, Debug)]
#[command(
    name = "git-ssh-uplift",
    version,
    about = "Host-side proxy that runs git-over-SSH requests relayed by git-ssh-uplift-shim."
)]
struct Cli {
    /// Bind the uplift proxy to a specific local address and/or TCP port.
    /// host defaults to all addresses; port is randomly chosen if omitted.
    #[arg(long, value_name = "[host]:[port]", value_parser = parse_bind_addr)]
    bind: Option<SocketAddr>,

    /// Maximum number of concurrent connections; further connections are not
    /// accepted until one finishes. 0 or omitted means unlimited.
    #[arg(long, value_name = "N")]
    conns_max: Option<u32>,

    /// ssh program used for relayed requests
    #[arg(long, env = "GIT_SSH_UPLIFT_SSH", default_value = "ssh")]
    ssh_program: PathBuf,

    /// Print detailed execution info
    #[arg(long)]
    verbose: bool,

    /// Command (with arguments) to run once the proxy is serving; the proxy exits
    /// when it completes. SSH_UPLIFT_PORT is set in its environment.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    cmdargs: Vec<String>,
}

impl Cli {
    fn into_config(self) -> ProxyConfig {
        let defaults = ProxyConfig::default();
        ProxyConfig {
            bind: self.bind.unwrap_or(defaults.bind),
            conns_max: self.conns_max,
            ssh_program: self.ssh_program,
            command: self.cmdargs,
            verbose: self.verbose,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(PROG, cli.verbose);
    signals::install_termination_handlers();

    let cfg = cli.into_config();
    match proxy::run(&cfg).context("proxy") {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<UpliftError>()
                .map(exit_code_for_error)
                .unwrap_or(1);
            // A failing child already spoke for itself on the shared terminal.
            if !matches!(e.downcast_ref::<UpliftError>(), Some(UpliftError::Exit { .. })) {
                tracing::error!("{e:#}");
            }
            ExitCode::from(code)
        }
    }
}
