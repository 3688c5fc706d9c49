use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use git_ssh_uplift::logging::{self, env_is_truthy};
use git_ssh_uplift::{exit_code_for_error, shim, GitService, ShimEnv, UpliftError};

const PROG: &str = "git-ssh-uplift-shim";

#[derive(Parser, Debug)]
#[command(
    name = "git-ssh-uplift-shim",
    version,
    about = "Relay a git-over-SSH request to the git-ssh-uplift proxy on the host.",
    after_help = "Environment: UPLIFT_PORT (required), UPLIFT_HOST (optional proxy host override)"
)]
struct Cli {
    /// git-upload-pack or git-receive-pack
    #[arg(value_name = "git-service", value_parser = parse_service)]
    service: GitService,

    /// Remote user, or '-' for ssh's default
    #[arg(value_name = "user|-", allow_hyphen_values = true)]
    user: String,

    #[arg(value_name = "repo-host")]
    host: String,

    #[arg(value_name = "repo-path")]
    repo: String,
}

fn parse_service(s: &str) -> Result<GitService, String> {
    s.parse()
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let env = ShimEnv::from_env()?;
    let hdr = shim::header_from_args(cli.service, &cli.user, &cli.host, &cli.repo);
    shim::run(&hdr, &env).context("proxy")?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(PROG, env_is_truthy("GIT_SSH_UPLIFT_VERBOSE"));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            let code = e
                .downcast_ref::<UpliftError>()
                .map(exit_code_for_error)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
