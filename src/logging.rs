//! Log setup shared by the binaries.
//!
//! Lines are `timestamp - target - LEVEL - message`, written to stderr and,
//! when a log file is configured, appended to it as well.

use anyhow::{anyhow, Context, Result};
use env_logger::{Env, Target};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub const DEFAULT_LOG_FILE: &str = "weaving.log";

pub fn format_line(timestamp: &str, target: &str, level: log::Level, message: &str) -> String {
    format!("{} - {} - {} - {}", timestamp, target, level, message)
}

/// Installs the global logger. `RUST_LOG` overrides the default `info` filter.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let file = match log_file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?,
        ),
        None => None,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let line = format_line(
                &buf.timestamp_millis().to_string(),
                record.target(),
                record.level(),
                &record.args().to_string(),
            );
            writeln!(buf, "{}", line)
        })
        .target(Target::Pipe(Box::new(TeeWriter::new(file))))
        .try_init()
        .map_err(|e| anyhow!("logger already initialised: {}", e))
}

/// Stderr plus an optional append-only file.
struct TeeWriter {
    file: Option<File>,
}

impl TeeWriter {
    fn new(file: Option<File>) -> Self {
        Self { file }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    #[test]
    fn line_format() {
        let line = format_line(
            "2024-05-01T10:00:00.000Z",
            "weaving_inspect::pipeline",
            log::Level::Warn,
            "threshold displacement reached",
        );
        assert_eq!(
            line,
            "2024-05-01T10:00:00.000Z - weaving_inspect::pipeline - WARN - threshold displacement reached"
        );
    }

    #[test]
    fn tee_appends_to_file() {
        let tmp = NamedTempFile::new().unwrap();
        let file = OpenOptions::new().append(true).open(tmp.path()).unwrap();
        let mut tee = TeeWriter::new(Some(file));
        tee.write_all(b"first\n").unwrap();
        tee.write_all(b"second\n").unwrap();
        tee.flush().unwrap();

        let mut contents = String::new();
        File::open(tmp.path())
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}
