//! # Progress Reporting
//!
//! Every reconciliation run reports structured progress (run start, how
//! many branches were selected, one line per created/deleted/synced
//! sub-project, run duration) through the `ProgressSink` port instead of
//! writing to any fixed destination.
//!
//! The durable implementation is `FileSink`: a per-project log file that
//! survives the run and lets operators inspect what a scheduled
//! reconciliation did after the fact (including skipped runs, which are a
//! log line, not a silent no-op). `ConsoleSink` mirrors the same lines to
//! a terminal for interactive `sync` invocations, and `NullSink` discards
//! everything for callers that only care about the result.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

use console::style;
use log::warn;
use parking_lot::Mutex;

use crate::error::Result;

/// Structured per-run and per-item progress reporting.
pub trait ProgressSink: Send + Sync {
    /// Reports one progress line.
    fn message(&self, line: &str);

    /// Reports one failure line. Implementations should make these stand
    /// out; failures here are isolated per item and do not abort the run.
    fn error(&self, line: &str);
}

/// Appends timestamped progress lines to a per-project log file.
///
/// Lines are flushed as they are written so the log is usable even when a
/// run dies mid-way.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Opens (or creates) the log file at `path` for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_line(&self, prefix: &str, line: &str) {
        let stamp = humantime::format_rfc3339_seconds(SystemTime::now());
        let mut writer = self.writer.lock();
        // A log write failure must not take down the run it reports on.
        if writeln!(writer, "{} {}{}", stamp, prefix, line)
            .and_then(|_| writer.flush())
            .is_err()
        {
            warn!("Could not write to the synchronization log.");
        }
    }
}

impl ProgressSink for FileSink {
    fn message(&self, line: &str) {
        self.write_line("", line);
    }

    fn error(&self, line: &str) {
        self.write_line("ERROR ", line);
    }
}

/// Mirrors progress lines to the terminal.
pub struct ConsoleSink {
    use_color: bool,
}

impl ConsoleSink {
    /// Creates a console sink; `use_color` controls error styling.
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }
}

impl ProgressSink for ConsoleSink {
    fn message(&self, line: &str) {
        println!("{}", line);
    }

    fn error(&self, line: &str) {
        if self.use_color {
            eprintln!("{}", style(line).red());
        } else {
            eprintln!("ERROR {}", line);
        }
    }
}

/// Discards all progress output.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn message(&self, _line: &str) {}

    fn error(&self, _line: &str) {}
}

/// Forwards every line to two sinks, e.g. the durable log plus a terminal.
pub struct TeeSink<A, B>(pub A, pub B);

impl<A: ProgressSink, B: ProgressSink> ProgressSink for TeeSink<A, B> {
    fn message(&self, line: &str) {
        self.0.message(line);
        self.1.message(line);
    }

    fn error(&self, line: &str) {
        self.0.error(line);
        self.1.error(line);
    }
}
