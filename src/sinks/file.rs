//! File sink
//!
//! Appends one JSON line per event and rotates by size: when the current
//! file plus the incoming line would exceed `maxsize` megabytes, backups are
//! shifted (`path.1` is the newest) and a fresh file is started. Old backups
//! are trimmed by count (`maxbackups`) and by age (`maxage` days).
//!
//! All filesystem work runs on the blocking pool; a rotation can touch up to
//! 999 backup files and must not stall a runtime worker.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

/// Highest backup index ever kept.
const MAX_BACKUP_INDEX: usize = 999;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub path: String,
    /// Rotation threshold in megabytes. 0 disables rotation.
    pub maxsize: u64,
    /// Backups to keep. 0 keeps all (up to 999).
    pub maxbackups: usize,
    /// Delete backups older than this many days. 0 disables.
    pub maxage: u64,
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

struct FileState {
    file: Option<File>,
    size: u64,
    /// Set by `close` only; a failed rotation is not a closed sink.
    closed: bool,
}

/// Owns the live file and the rotation scheme. Shared with blocking-pool
/// closures, so every method here is synchronous.
struct FileWriter {
    path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    max_age: Duration,
    state: Mutex<FileState>,
}

pub struct FileSink {
    serializer: EventSerializer,
    writer: Arc<FileWriter>,
}

impl FileSink {
    pub fn new(config: FileConfig) -> Result<Self, SinkError> {
        if config.path.is_empty() {
            return Err(SinkError::Init("file sink requires a path".to_string()));
        }
        let path = PathBuf::from(&config.path);
        let file = open_append(&path)
            .map_err(|e| SinkError::Init(format!("cannot open {}: {}", config.path, e)))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            serializer: EventSerializer::new(config.serializer),
            writer: Arc::new(FileWriter {
                path,
                max_bytes: config.maxsize * 1024 * 1024,
                max_backups: config.maxbackups.min(MAX_BACKUP_INDEX),
                max_age: Duration::from_secs(config.maxage * 24 * 60 * 60),
                state: Mutex::new(FileState {
                    file: Some(file),
                    size,
                    closed: false,
                }),
            }),
        })
    }
}

impl FileWriter {
    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    /// Append one line, rotating first when the size threshold would be
    /// crossed. A rotation failure surfaces for this event only: the live
    /// file is re-attached so the next send can try again.
    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Send("file sink is closed".to_string()));
        }
        if state.file.is_none() {
            // A previous rotation failure may have lost the handle.
            self.reopen(&mut state)?;
        }

        if self.max_bytes > 0 && state.size + line.len() as u64 > self.max_bytes {
            if let Err(e) = self.rotate(&mut state) {
                // Best effort; if this fails too, the next send retries.
                let _ = self.reopen(&mut state);
                return Err(SinkError::Send(format!("rotation failed: {e}")));
            }
        }

        // Present: checked or re-established above.
        if let Some(file) = state.file.as_mut() {
            file.write_all(line)?;
            state.size += line.len() as u64;
        }
        Ok(())
    }

    fn reopen(&self, state: &mut FileState) -> std::io::Result<()> {
        let file = open_append(&self.path)?;
        state.size = file.metadata().map(|m| m.len()).unwrap_or(0);
        state.file = Some(file);
        Ok(())
    }

    /// Shift `path.N` up by one (dropping `path.999`), move the live file to
    /// `path.1`, then trim backups by count and age.
    fn rotate(&self, state: &mut FileState) -> std::io::Result<()> {
        state.file.take();

        let last = self.backup_path(MAX_BACKUP_INDEX);
        if last.exists() {
            std::fs::remove_file(&last)?;
        }
        for n in (1..MAX_BACKUP_INDEX).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        if self.path.exists() {
            std::fs::rename(&self.path, self.backup_path(1))?;
        }

        if self.max_backups > 0 {
            for n in (self.max_backups + 1)..=MAX_BACKUP_INDEX {
                let backup = self.backup_path(n);
                if backup.exists() {
                    std::fs::remove_file(&backup)?;
                }
            }
        }

        if !self.max_age.is_zero() {
            for n in 1..=MAX_BACKUP_INDEX {
                let backup = self.backup_path(n);
                let Ok(meta) = std::fs::metadata(&backup) else {
                    continue;
                };
                let expired = meta
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .is_some_and(|age| age > self.max_age);
                if expired {
                    debug!(path = %backup.display(), "removing expired backup");
                    std::fs::remove_file(&backup)?;
                }
            }
        }

        state.file = Some(open_append(&self.path)?);
        state.size = 0;
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(mut file) = state.file.take() {
            if let Err(e) = file.flush() {
                warn!(path = %self.path.display(), error = %e, "flush on close failed");
            }
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let mut line = self.serializer.serialize(event)?;
        line.push(b'\n');

        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || writer.write(&line))
            .await
            .map_err(|e| SinkError::Send(format!("writer task failed: {e}")))?
    }

    async fn close(&self) {
        let writer = Arc::clone(&self.writer);
        let _ = tokio::task::spawn_blocking(move || writer.close()).await;
    }
}
