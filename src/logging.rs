//! Tracing setup: coloured stderr plus a size-rotated `journal.log`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::{PipelineError, Result};

/// Append-only log file that rolls over once it reaches `max_bytes`.
///
/// Generations are kept as `<name>.1` (newest) to `<name>.<generations>`
/// (oldest); the oldest is deleted on rotation.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    generations: usize,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, generations: usize) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
            generations,
        })
    }

    fn generation_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.generations == 0 {
            self.file = File::create(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.generation_path(self.generations);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for n in (1..self.generations).rev() {
            let from = self.generation_path(n);
            if from.exists() {
                std::fs::rename(&from, self.generation_path(n + 1))?;
            }
        }
        std::fs::rename(&self.path, self.generation_path(1))?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`. Calling this twice is harmless: the second
/// call leaves the first subscriber in place.
pub fn init_logging(config: &Config, level: &str) -> Result<()> {
    let logs = config.logs_folder();
    std::fs::create_dir_all(&logs).map_err(|e| PipelineError::io(&logs, e))?;

    let path = config.log_file();
    let journal = RotatingFile::open(&path, config.log_max_bytes, config.log_generations)
        .map_err(|e| PipelineError::io(&path, e))?;

    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(level)),
        Err(_) => EnvFilter::try_new(format!("{level},hyper=warn,reqwest=warn"))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(io::stderr);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(journal));

    // Already-installed subscribers (tests, embedding) are left alone.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}
