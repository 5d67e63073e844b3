pub mod stream_stats;

pub use stream_stats::StreamStats;

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// Logs go to stderr; stdout is reserved for the streamed answer.
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let filter = EnvFilter::try_new(tracing_directive(&level))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_directive(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// Log the statistics of a finished stream, computing duration from start time.
pub fn log_stream_complete(state: &str, stats: &StreamStats, start_time: std::time::Instant) {
    stream_stats::log_stream_stats(state, stats, start_time.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_aliases() {
        assert_eq!(tracing_directive("WARNING"), "WARN");
        assert_eq!(tracing_directive("CRITICAL"), "ERROR");
        assert_eq!(tracing_directive("DEBUG"), "DEBUG");
    }
}
