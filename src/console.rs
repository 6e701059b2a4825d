//! Local console mirroring of shipped entries
//!
//! Echoed lines go straight to standard output and never through `tracing`,
//! so the interception layer can never see them.

use crate::entry::{LogEntry, LogLevel};
use std::io::Write;

const RESET: &str = "\x1b[0m";

fn color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "\x1b[90m",
        LogLevel::Info => "\x1b[36m",
        LogLevel::Warn => "\x1b[33m",
        LogLevel::Error => "\x1b[31m",
        LogLevel::Critical => "\x1b[1;35m",
    }
}

/// `[12:04:05.123] [WARN] (engine) message`, with the level tag colored.
pub fn render_line(entry: &LogEntry) -> String {
    format!(
        "[{}] {}[{}]{} ({}) {}",
        entry.timestamp.format("%H:%M:%S%.3f"),
        color(entry.level),
        entry.level,
        RESET,
        entry.source,
        entry.message
    )
}

/// Write the rendered entry to stdout. Write failures are ignored.
pub fn echo(entry: &LogEntry) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", render_line(entry));
}
