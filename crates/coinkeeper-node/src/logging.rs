use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `log_filter` when set.
pub(crate) fn init_logging(log_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter))
        .map_err(|err| Error::Logging(err.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| Error::Logging(err.to_string()))
}
