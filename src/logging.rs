//! Stderr logging: `<prog>: <message>`, no timestamps, initialised once.
use std::env;
use std::fmt;

use once_cell::sync::OnceCell;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// EnvFilter directives; overrides the verbosity default when set.
pub const ENV_LOG: &str = "GIT_SSH_UPLIFT_LOG";

static INIT: OnceCell<()> = OnceCell::new();

struct PrefixFormat {
    prog: &'static str,
}

impl<S, N> FormatEvent<S, N> for PrefixFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{}: ", self.prog)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub fn env_is_truthy(key: &str) -> bool {
    matches!(
        env::var(key).ok().as_deref(),
        Some("1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
    )
}

/// Install the stderr subscriber for `prog`. Later calls are no-ops.
pub fn init(prog: &'static str, verbose: bool) {
    if INIT.get().is_some() {
        return;
    }
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(default));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(PrefixFormat { prog })
        .with_writer(std::io::stderr);
    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("{prog}: logging init skipped (global subscriber already set)");
    }
    let _ = INIT.set(());
}
