//! Log output for the `relgate` CLI.
//!
//! Pipeline events from [`crate::obs`] and stage logs are written to stderr.
//! Stdout carries only the run summary, so a CI step can capture it
//! separately from the logs.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber.
///
/// `json` maps to `relgate --json` and switches to one JSON object per event,
/// which suits CI log collectors. `level` comes from `--verbose` and applies
/// only when `RUST_LOG` is unset or unparsable.
pub fn init_tracing(json: bool, level: Level) {
    let stage_logs = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(log_filter(level));

    // A second call finds the global subscriber already set and is ignored.
    let _ = if json {
        registry.with(stage_logs.json()).try_init()
    } else {
        registry.with(stage_logs).try_init()
    };
}

fn log_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_level_is_default_filter() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(
                log_filter(Level::DEBUG).max_level_hint(),
                Some(tracing::level_filters::LevelFilter::DEBUG)
            );
        }
    }

    #[test]
    fn test_repeated_init_keeps_first_subscriber() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
