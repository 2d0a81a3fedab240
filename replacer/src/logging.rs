//! Log output for the binary.
//!
//! The library only emits records through the `log` facade. The binary
//! installs a `tracing-subscriber` formatter once at startup; its `log`
//! bridge forwards those records to stderr. `RUST_LOG` overrides the level
//! derived from `-v`/`-q`.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Map CLI flags onto a level filter.
///
/// Quiet shows errors only; each `-v` widens the default of warnings.
#[must_use]
pub const fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Build the filter for `level`, letting `RUST_LOG` take precedence.
#[must_use]
pub fn filter_for(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the stderr subscriber with `level`.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber or `log` logger was
/// already installed.
pub fn init(level: LevelFilter) -> Result<(), TryInitError> {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .without_time()
        .finish()
        .try_init()
}
