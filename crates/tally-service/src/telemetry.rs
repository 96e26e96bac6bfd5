//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// ledger crates only.
pub fn init(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::default()
            .add_directive(format!("tally_accrual={}", logging.level).parse()?)
            .add_directive(format!("tally_ledger={}", logging.level).parse()?)
            .add_directive(format!("tally_db={}", logging.level).parse()?)
            .add_directive(format!("tally_service={}", logging.level).parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber already installed: {e}"))
}
