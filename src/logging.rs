//! Process-wide logging for the `bully` binary.
//!
//! Library code only uses the `log` macros. By default those records are
//! bridged into a `tracing-subscriber` fmt layer on stderr. With
//! `BULLY_LOG_FILE` set, `env_logger` owns the `log` facade instead and
//! writes plain lines to a size-rotated file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Plain-text log sink that rolls `path` over to `path.1`, `path.2`, ...
/// once it grows past `limit` bytes.
struct RotatingFile {
    path: String,
    limit: u64,
    keep: u32,
    file: File,
    written: u64,
}

impl RotatingFile {
    fn open(path: String, limit: u64, keep: u32) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            limit,
            keep,
            file,
            written,
        })
    }

    fn roll(&mut self) -> io::Result<()> {
        for i in (1..self.keep).rev() {
            let _ = std::fs::rename(format!("{}.{i}", self.path), format!("{}.{}", self.path, i + 1));
        }
        let _ = std::fs::rename(&self.path, format!("{}.1", self.path));

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.limit {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

/// An `env_logger` builder (filtered by `RUST_LOG`, default `info`) that
/// writes into a rotating file at `path`.
pub fn file_logger(path: &str, max_bytes: u64, max_files: u32) -> io::Result<env_logger::Builder> {
    let file = RotatingFile::open(path.to_string(), max_bytes, max_files)?;

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder
        .target(env_logger::Target::Pipe(Box::new(file)))
        .write_style(env_logger::WriteStyle::Never);
    Ok(builder)
}

pub fn init_logging() {
    if let Ok(path) = std::env::var("BULLY_LOG_FILE") {
        let max_size_mb: u64 = env_number("BULLY_LOG_MAX_SIZE_MB", 10);
        let max_files: u32 = env_number("BULLY_LOG_MAX_FILES", 3);

        match file_logger(&path, max_size_mb * 1024 * 1024, max_files) {
            Ok(mut builder) => match builder.try_init() {
                Ok(()) => return,
                Err(e) => eprintln!("Cannot install file logger: {e}"),
            },
            Err(e) => eprintln!("Cannot open log file {path}: {e}"),
        }
    }

    let _ = LogTracer::init();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
