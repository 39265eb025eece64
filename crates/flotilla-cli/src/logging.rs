//! Log setup for harness binaries

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding a log filter
pub const LOG_ENV: &str = "FLOTILLA_LOG";

/// Install the stderr log subscriber
///
/// Priority: `FLOTILLA_LOG` > verbose flag (`info`) > default (`warn`).
/// Installing twice is harmless.
pub fn init(verbose: bool) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::new(spec),
        _ if verbose => EnvFilter::new("info"),
        _ => EnvFilter::new("warn"),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
