//! Plugin-side logging
//!
//! Logs go to stderr since stdout carries the RPC stream. The host forwards
//! each stderr line into its own `tracing` output.

use tracing::level_filters::LevelFilter;

pub const LOG_ENV: &str = "JP_LOG";

/// `TRACE`, `DEBUG`, `INFO`, `WARN` or `ERROR`; anything else disables logging.
pub fn parse_level(value: Option<&str>) -> LevelFilter {
    match value {
        Some("TRACE") => LevelFilter::TRACE,
        Some("DEBUG") => LevelFilter::DEBUG,
        Some("INFO") => LevelFilter::INFO,
        Some("WARN") => LevelFilter::WARN,
        Some("ERROR") => LevelFilter::ERROR,
        _ => LevelFilter::OFF,
    }
}

pub fn level_from_env() -> LevelFilter {
    parse_level(std::env::var(LOG_ENV).ok().as_deref())
}

/// Install the stderr subscriber. A second call is a no-op.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_from_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::DEBUG);
        assert_eq!(parse_level(Some("ERROR")), LevelFilter::ERROR);
        assert_eq!(parse_level(Some("debug")), LevelFilter::OFF);
        assert_eq!(parse_level(None), LevelFilter::OFF);
    }
}
