//! Structured logging for strata.
//!
//! Console output with uptime timestamps and module paths, plus an optional
//! JSON file log. The level comes from `RUST_LOG` or the config's
//! `debug.log_level`.

use std::path::Path;

use strata_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info,tiny_http=warn";

/// File name of the JSON log inside `log_dir`.
pub const LOG_FILE_NAME: &str = "strata.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file
/// * `file_logging` - whether to write the JSON log at all
/// * `config` - optional configuration providing the level override
///
/// ```no_run
/// use strata_log::init_logging;
///
/// init_logging(None, false, None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, file_logging: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if file_logging
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Directive that keeps the HTTP server library quiet.
const QUIET_DEPS: &str = "tiny_http=warn";

/// Filter directive derived from the config, falling back to [`DEFAULT_FILTER`].
///
/// A configured level is extended with `tiny_http=warn` unless it already
/// says something about `tiny_http`.
pub fn filter_string(config: Option<&Config>) -> String {
    let level = match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => config.debug.log_level.trim(),
        _ => return DEFAULT_FILTER.to_string(),
    };
    if level.contains("tiny_http") {
        level.to_string()
    } else {
        format!("{level},{QUIET_DEPS}")
    }
}

/// An `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_level(level: &str) -> Config {
        let mut config = Config::default();
        config.debug.log_level = level.to_string();
        config
    }

    #[test]
    fn test_default_filter_quiets_http() {
        let filter = default_env_filter().to_string();
        assert!(filter.contains("tiny_http=warn"));
        assert!(filter.contains("info"));
    }

    #[test]
    fn test_config_level_keeps_http_quiet() {
        let config = with_level("debug,strata_stream=trace");
        assert_eq!(
            filter_string(Some(&config)),
            "debug,strata_stream=trace,tiny_http=warn"
        );
    }

    #[test]
    fn test_explicit_http_directive_is_kept() {
        let config = with_level("info,tiny_http=debug");
        assert_eq!(filter_string(Some(&config)), "info,tiny_http=debug");
    }

    #[test]
    fn test_blank_level_falls_back() {
        assert_eq!(filter_string(Some(&with_level("  "))), DEFAULT_FILTER);
        assert_eq!(filter_string(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_derived_filters_parse() {
        for level in ["warn", "debug,strata_server=trace", "strata_mesh=trace"] {
            let directive = filter_string(Some(&with_level(level)));
            assert!(
                EnvFilter::try_new(&directive).is_ok(),
                "rejected {directive}"
            );
        }
    }
}
