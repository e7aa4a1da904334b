//! Stdout sink
//!
//! Writes one JSON line per event. Useful for piping into another collector
//! or for debugging.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

pub struct StdoutSink {
    serializer: EventSerializer,
    written: AtomicU64,
}

impl StdoutSink {
    pub fn new(config: StdoutConfig) -> Self {
        Self {
            serializer: EventSerializer::new(config.serializer),
            written: AtomicU64::new(0),
        }
    }

    /// Total events written so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let line = self.serializer.serialize(event)?;

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&line)?;
        stdout.write_all(b"\n")?;

        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
