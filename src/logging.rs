//! Tracing setup shared by the relay server and the scanner.
//!
//! Both binaries filter with `RUST_LOG` and write compact records to a console stream. The server
//! also appends to a log file (`LLM_RELAY_LOG_FILE`, default `logs/llm-relay.log`) through a
//! non-blocking writer. Records carry counts, sizes, and identifiers, never document or prompt
//! text.
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "LLM_RELAY_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/llm-relay.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Console destination, default verbosity, and optional file sink for one process.
struct LogSetup {
    default_filter: &'static str,
    console: BoxMakeWriter,
    file: Option<NonBlocking>,
}

impl LogSetup {
    fn install(self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_filter));
        let console = fmt::layer()
            .with_writer(self.console)
            .with_target(false)
            .compact();
        let file = self.file.map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact()
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .with(file)
            .init();
    }
}

/// Server logging: stdout at `info` plus the append-only log file.
pub fn init_tracing() {
    let path = log_file_path(std::env::var(LOG_FILE_VAR).ok());
    LogSetup {
        default_filter: "info",
        console: BoxMakeWriter::new(std::io::stdout),
        file: open_log_file(&path),
    }
    .install();
}

/// Scanner logging: stderr only at `warn`, leaving stdout for JSON reports.
pub fn init_cli_tracing() {
    LogSetup {
        default_filter: "warn",
        console: BoxMakeWriter::new(std::io::stderr),
        file: None,
    }
    .install();
}

fn log_file_path(configured: Option<String>) -> PathBuf {
    configured
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

/// Open `path` for appending, creating its directory first. File logging is skipped on failure.
fn open_log_file(path: &Path) -> Option<NonBlocking> {
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Err(err) = dir.map_or(Ok(()), fs::create_dir_all) {
        eprintln!("Failed to create log directory for {}: {err}", path.display());
        return None;
    }

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_defaults_when_unset_or_blank() {
        assert_eq!(log_file_path(None), PathBuf::from("logs/llm-relay.log"));
        assert_eq!(log_file_path(Some("  ".into())), PathBuf::from("logs/llm-relay.log"));
        assert_eq!(
            log_file_path(Some("/var/log/relay.log".into())),
            PathBuf::from("/var/log/relay.log")
        );
    }

    #[test]
    fn log_file_directory_is_created() {
        let dir = std::env::temp_dir().join(format!("llm-relay-logs-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("relay.log");

        assert!(open_log_file(&path).is_some());
        assert!(path.exists());

        fs::remove_dir_all(dir).ok();
    }
}
