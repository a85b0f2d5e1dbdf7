//! Logging infrastructure.
//!
//! Structured logging to the console and to a log file in the run workspace:
//! - The file is appended to, so a resumed run keeps the history of
//!   earlier attempts
//! - Console output is compact for tailing long runs
//! - The filter comes from `RUST_LOG`, else the configured level; `--debug`
//!   forces `debug`

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging system.
///
/// # Arguments
///
/// * `log_file` - Log file path; its directory is created if needed
/// * `level` - Filter directive used when `RUST_LOG` is unset
/// * `debug` - Force the `debug` level regardless of the environment
///
/// # Returns
///
/// LoggingGuard that must be kept alive for logging to work
///
/// # Errors
///
/// Returns error if the log directory cannot be created
pub fn init_logging(log_file: &Path, level: &str, debug: bool) -> Result<LoggingGuard, io::Error> {
    let log_dir = match log_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(log_dir)?;
    let file_name = log_file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log file has no file name"))?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let directive = filter_directive(level, debug, std::env::var("RUST_LOG").ok());
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Filter directive from the debug flag, `RUST_LOG`, and the configured
/// level, in that order of precedence.
fn filter_directive(level: &str, debug: bool, env: Option<String>) -> String {
    if debug {
        return "debug".to_string();
    }
    match env {
        Some(v) if !v.trim().is_empty() => v,
        _ if level.trim().is_empty() => "info".to_string(),
        _ => level.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(filter_directive("warn", true, Some("trace".into())), "debug");
        assert_eq!(filter_directive("warn", false, Some("trace".into())), "trace");
        assert_eq!(filter_directive("warn", false, None), "warn");
        assert_eq!(filter_directive("", false, Some(" ".into())), "info");
    }

    #[test]
    fn test_guard_structure() {
        use tracing_appender::non_blocking::NonBlocking;

        let (non_blocking, guard) = NonBlocking::new(std::io::sink());
        drop(non_blocking);

        let _logging_guard = LoggingGuard { _file_guard: guard };
    }

    #[test]
    fn test_appender_appends_to_existing_file() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "earlier run\n").unwrap();

        let mut appender = tracing_appender::rolling::never(dir.path(), "run.log");
        appender.write_all(b"resumed run\n").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier run\nresumed run\n");
    }

    // Installing the global subscriber can only happen once per process, so
    // init_logging itself is exercised by the CLI rather than here.
}
