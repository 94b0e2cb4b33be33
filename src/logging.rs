/*!
 * Logging and tracing initialization
 *
 * Nothing in the library installs a subscriber on its own. Build a
 * [`tracing::Dispatch`] from [`LogSettings`] and hand it to whoever owns the
 * process: `init_logging` installs it globally, tests and embedders can
 * scope it with `tracing::dispatcher::with_default`.
 */

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Dispatch, Level};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    EnvFilter,
};

use crate::config::LogSettings;
use crate::error::{RampartError, Result};

/// Level actually used once `verbose` is taken into account
pub fn effective_level(settings: &LogSettings) -> Level {
    if settings.verbose {
        Level::DEBUG
    } else {
        settings.level.to_tracing_level()
    }
}

/// Build a dispatcher for the given settings without installing it
pub fn build_dispatch(settings: &LogSettings) -> Result<Dispatch> {
    let level = effective_level(settings);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "rampart={},rampart_core_resilience={}",
                level, level
            ))
        })
        .map_err(|e| RampartError::Logging(format!("Failed to create log filter: {}", e)))?;

    match settings.file {
        Some(ref log_path) => file_dispatch(log_path, env_filter),
        None => Ok(stdout_dispatch(env_filter)),
    }
}

/// Build and install the process-wide subscriber
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let dispatch = build_dispatch(settings)?;
    tracing::dispatcher::set_global_default(dispatch)
        .map_err(|e| RampartError::Logging(e.to_string()))
}

/// Compact human-readable output on stdout
fn stdout_dispatch(env_filter: EnvFilter) -> Dispatch {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    Dispatch::new(tracing_subscriber::registry().with(env_filter).with(fmt_layer))
}

/// JSON lines written to a file
fn file_dispatch(log_path: &Path, env_filter: EnvFilter) -> Result<Dispatch> {
    let file = File::create(log_path).map_err(|e| RampartError::io(log_path, e))?;

    let fmt_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false) // No ANSI colors in file
        .json();

    Ok(Dispatch::new(
        tracing_subscriber::registry().with(env_filter).with(fmt_layer),
    ))
}
