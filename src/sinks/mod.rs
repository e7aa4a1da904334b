//! Sink system for kubesee
//!
//! Sinks deliver routed events to their destinations (webhook endpoints,
//! Elasticsearch, Kafka, files, ...). Each receiver owns one sink instance,
//! created by [`build`] from the receiver's single sink-type key.

pub mod elasticsearch;
pub mod file;
pub mod in_memory;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod loki;
pub mod opensearch;
pub mod pipe;
pub mod ser;
pub mod stdout;
pub mod syslog;
pub mod tls;
pub mod webhook;

mod index;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::Receiver;
use crate::error::SinkError;
use crate::event::Event;

pub use ser::{EventSerializer, SerializerConfig};
pub use tls::TlsConfig;

/// A running destination adapter.
///
/// Construction plays the role of `start`: it may perform network or file
/// setup and its failure is terminal for that receiver only. `send` is
/// synchronous from the worker's point of view and may block up to the
/// sink's own timeout. `close` is an idempotent resource release.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, event: &Event) -> Result<(), SinkError>;

    async fn close(&self) {}
}

impl std::fmt::Debug for dyn Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Sink")
    }
}

fn sink_config<T: DeserializeOwned>(value: &serde_yaml::Value) -> Result<T, SinkError> {
    serde_yaml::from_value(value.clone()).map_err(|e| SinkError::Init(e.to_string()))
}

/// Construct the sink a receiver names. This is the single map from config
/// key to constructor.
pub async fn build(receiver: &Receiver) -> Result<Arc<dyn Sink>, SinkError> {
    let (kind, value) = receiver
        .sink_entry()
        .map_err(|e| SinkError::Init(e.to_string()))?;

    let sink: Arc<dyn Sink> = match kind {
        "stdout" => Arc::new(stdout::StdoutSink::new(sink_config(value)?)),
        "file" => Arc::new(file::FileSink::new(sink_config(value)?)?),
        "webhook" => Arc::new(webhook::WebhookSink::new(sink_config(value)?)?),
        "pipe" => Arc::new(pipe::PipeSink::open(sink_config(value)?).await?),
        "syslog" => Arc::new(syslog::SyslogSink::connect(sink_config(value)?).await?),
        "loki" => Arc::new(loki::LokiSink::new(sink_config(value)?)?),
        "elasticsearch" => Arc::new(elasticsearch::ElasticsearchSink::new(sink_config(value)?)?),
        "opensearch" => Arc::new(opensearch::OpenSearchSink::new(sink_config(value)?)?),
        #[cfg(feature = "kafka")]
        "kafka" => Arc::new(kafka::KafkaSink::new(sink_config(value)?)?),
        #[cfg(not(feature = "kafka"))]
        "kafka" => {
            return Err(SinkError::Init(
                "kubesee was built without kafka support".to_string(),
            ))
        }
        "inMemory" => Arc::new(in_memory::InMemorySink::new(sink_config(value)?)),
        other => {
            // Unreachable for validated configs; kept total for direct callers.
            return Err(SinkError::Init(format!("unknown sink type '{other}'")));
        }
    };

    Ok(sink)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_factory_builds_each_simple_kind() {
        let yaml = r#"
receivers:
  - name: a
    stdout: {}
  - name: b
    inMemory: {}
"#;
        let config = Config::from_yaml(yaml).unwrap();
        for receiver in &config.receivers {
            assert!(build(receiver).await.is_ok(), "failed for {}", receiver.name);
        }
    }

    #[tokio::test]
    async fn test_factory_rejects_bad_sink_config() {
        let yaml = r#"
receivers:
  - name: w
    webhook:
      endpoint: 123
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let err = build(&config.receivers[0]).await.unwrap_err();
        assert!(matches!(err, SinkError::Init(_)));
    }
}
