//! Tracing setup for the `hintdis` binary.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter, e.g. `HINTDIS_LOG=hintdis_core=debug`.
pub const LOG_ENV: &str = "HINTDIS_LOG";

const DEFAULT_FILTER: &str = "hintdis=info,hintdis_core=info";

/// Install the global subscriber. Logs go to stderr so stdout stays parseable.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        // A subscriber installed by an embedding host wins.
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
    });
}
