use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Bounded in-memory log, mirrored to a file when one is attached.
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
    file: Option<PathBuf>,
    echo_stderr: bool,
}

impl RunLog {
    #[cfg(test)]
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn with_file(path: PathBuf) -> Self {
        Self {
            entries: Vec::new(),
            file: Some(path),
            echo_stderr: false,
        }
    }

    /// Warnings and errors are also printed to stderr (CLI mode).
    pub fn echo_stderr(mut self, echo: bool) -> Self {
        self.echo_stderr = echo;
        self
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn info(&mut self, message: String) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: String) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: String) {
        self.push(LogLevel::Error, message);
    }

    /// Moves entries from another log (a worker's) into this one without
    /// writing them to the file again.
    pub fn absorb(&mut self, other: RunLog) {
        for entry in other.entries {
            self.keep(entry);
        }
    }

    fn push(&mut self, level: LogLevel, message: String) {
        if self.echo_stderr && level != LogLevel::Info {
            eprintln!("{}: {message}", log_level_label(level).to_lowercase());
        }
        if let Some(path) = &self.file {
            let _ = append_log_file(path, level, &message);
        }
        self.keep(LogEntry { level, message });
    }

    fn keep(&mut self, entry: LogEntry) {
        self.entries.push(entry);
        if self.entries.len() > LOG_CAPACITY {
            let overflow = self.entries.len() - LOG_CAPACITY;
            self.entries.drain(0..overflow);
        }
    }
}

pub fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let stamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{label}] {stamp} {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_leveled_lines_to_file() {
        let td = tempfile::tempdir().expect("tempdir");
        let path = td.path().join("sixfix.log");
        let mut log = RunLog::with_file(path.clone());
        log.info("locating".to_string());
        log.error("write failed".to_string());

        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[INFO] "));
        assert!(lines[0].ends_with(" locating"));
        assert!(lines[1].starts_with("[ERROR] "));
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn memory_log_is_bounded() {
        let mut log = RunLog::memory();
        for index in 0..(LOG_CAPACITY + 10) {
            log.info(format!("line {index}"));
        }
        assert_eq!(log.entries().len(), LOG_CAPACITY);
        assert_eq!(log.entries()[0].message, "line 10");
    }
}
