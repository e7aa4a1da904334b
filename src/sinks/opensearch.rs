//! OpenSearch sink
//!
//! The wire surface is identical to Elasticsearch (index format, `_doc`
//! path, PUT on `useEventID`, Basic/ApiKey auth), so this delegates to the
//! shared document sink rather than carrying a second copy of it.

use async_trait::async_trait;

use super::elasticsearch::{ElasticsearchConfig, ElasticsearchSink};
use super::Sink;
use crate::error::SinkError;
use crate::event::Event;

pub type OpenSearchConfig = ElasticsearchConfig;

pub struct OpenSearchSink {
    inner: ElasticsearchSink,
}

impl OpenSearchSink {
    pub fn new(config: OpenSearchConfig) -> Result<Self, SinkError> {
        Ok(Self {
            inner: ElasticsearchSink::new(config)?,
        })
    }
}

#[async_trait]
impl Sink for OpenSearchSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        self.inner.send(event).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}
