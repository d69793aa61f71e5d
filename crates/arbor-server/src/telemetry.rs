//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Build the filter: `RUST_LOG` if set and valid, else `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. Call once at startup.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_level: &str, format: LogFormat) -> bool {
    let filter = env_filter(default_level);
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_accepts_directives() {
        let filter = env_filter("info,arbor_server=debug");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn second_init_reports_already_installed() {
        let _ = init_tracing("warn", LogFormat::Pretty);
        assert!(!init_tracing("warn", LogFormat::Json));
    }
}
