//! Pipe sink
//!
//! Writes JSON lines to a file or device path, typically a named pipe. The
//! path is opened once at start and held for the sink's lifetime.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    pub path: String,
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

pub struct PipeSink {
    serializer: EventSerializer,
    file: Mutex<Option<File>>,
}

impl PipeSink {
    pub async fn open(config: PipeConfig) -> Result<Self, SinkError> {
        if config.path.is_empty() {
            return Err(SinkError::Init("pipe sink requires a path".to_string()));
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await
            .map_err(|e| SinkError::Init(format!("cannot open {}: {}", config.path, e)))?;

        Ok(Self {
            serializer: EventSerializer::new(config.serializer),
            file: Mutex::new(Some(file)),
        })
    }
}

#[async_trait]
impl Sink for PipeSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let mut line = self.serializer.serialize(event)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return Err(SinkError::Send("pipe is closed".to_string()));
        };
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        self.file.lock().await.take();
    }
}
