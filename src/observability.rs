//! Logging setup

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` (usually `telemetry.log_filter`).
/// Calling it twice is harmless; the second call keeps the first subscriber.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init_tracing("debug");
        init_tracing("not a [valid filter");
        tracing::info!("still logging");
    }
}
