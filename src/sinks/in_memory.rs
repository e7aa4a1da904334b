//! In-memory sink
//!
//! Stores delivered events in insertion order. Exists for tests and local
//! experiments; the store can be shared before the sink is handed to the
//! registry.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

/// Shared handle to the delivered events.
pub type EventStore = Arc<Mutex<Vec<Event>>>;

pub struct InMemorySink {
    serializer: EventSerializer,
    store: EventStore,
}

impl InMemorySink {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            serializer: EventSerializer::new(config.serializer),
            store: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A handle to the store, valid after the sink is consumed by the
    /// registry.
    pub fn store(&self) -> EventStore {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        // Serialisation runs even though the bytes are discarded, so layout
        // errors behave the same as in real sinks.
        self.serializer.serialize(event)?;
        self.store.lock().push(event.clone());
        Ok(())
    }
}
